use snafu::prelude::*;

/// HTTP Error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(variant), context(suffix(false)))]
pub enum Error {
    /// authorization value contains character that cant be send in HTTP header
    #[snafu(display("authorization value {value:?} is invalid"))]
    AuthorizationInvalid {
        /// input value
        value: String,
    },

    /// user agent contains character that cant be send in HTTP header
    #[snafu(display("user agent {value:?} is invalid"))]
    UserAgentInvalid {
        /// input value
        value: String,
    },

    /// create HTTP client failed
    #[snafu(display("create http client failed: {source}"))]
    ClientCreateFailed {
        /// source error
        source: reqwest::Error,
    },

    /// send request or read response failed
    #[snafu(display("{} url {url} failed: {source}", method.as_str()))]
    RequestFailed {
        /// http method
        method: reqwest::Method,
        /// target url
        url: String,
        /// source http error
        source: reqwest::Error,
    },

    /// http response status is not 2xx
    #[snafu(display("{} url {url} got http status code {status_code}", method.as_str()))]
    HTTPStatusNotOK {
        /// http method
        method: reqwest::Method,
        /// request url
        url: String,
        /// received http status code
        status_code: reqwest::StatusCode,
    },
}

impl Error {
    /// received http status, if the request reached the server
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::HTTPStatusNotOK { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Check if the request timed out
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestFailed { source, .. } if source.is_timeout())
    }
}
