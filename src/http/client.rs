use std::time::Duration;

use reqwest::{
    header::{self, HeaderMap, HeaderValue},
    Method,
};
use snafu::prelude::*;
use url::Url;

use super::error::variant::*;
use super::Result;
use crate::Config;

/// HTTP client of the polling transport
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    authorization: Option<HeaderValue>,
    user_agent: HeaderValue,
}

impl Client {
    /// Create a client with authorization and user agent in config
    pub fn new(config: &Config) -> Result<Self> {
        let authorization = match config.authorization {
            Some(ref value) => {
                let mut v: HeaderValue = value
                    .parse()
                    .map_err(|_| AuthorizationInvalid { value }.build())?;
                v.set_sensitive(true);
                Some(v)
            }
            None => None,
        };

        let user_agent: HeaderValue = config.user_agent.parse().map_err(|_| {
            UserAgentInvalid {
                value: &config.user_agent,
            }
            .build()
        })?;

        let mut headers = HeaderMap::new();
        if let Some(ref v) = authorization {
            headers.insert(header::AUTHORIZATION, v.clone());
        }

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self {
            client,
            authorization,
            user_agent,
        })
    }

    /// headers the socket transport must carry too
    pub fn socket_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, self.user_agent.clone());
        if let Some(ref v) = self.authorization {
            headers.insert(header::AUTHORIZATION, v.clone());
        }
        headers
    }

    async fn request(
        &self,
        method: Method,
        url: &Url,
        body: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let mut req = self.client.request(method.clone(), url.clone());

        if let Some(body) = body {
            req = req
                .header(header::CONTENT_TYPE, "text/plain;charset=UTF-8")
                .body(body);
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        log::trace!("{} {}", method, url);

        let resp = req.send().await.with_context(|_| RequestFailed {
            method: method.clone(),
            url: url.as_str(),
        })?;

        ensure!(
            resp.status().is_success(),
            HTTPStatusNotOK {
                method: method.clone(),
                url: url.as_str(),
                status_code: resp.status()
            }
        );

        resp.text().await.with_context(|_| RequestFailed {
            method,
            url: url.as_str(),
        })
    }

    /// GET a payload
    pub async fn get(&self, url: &Url, timeout: Option<Duration>) -> Result<String> {
        self.request(Method::GET, url, None, timeout).await
    }

    /// POST a payload
    pub async fn post(&self, url: &Url, body: String) -> Result<String> {
        self.request(Method::POST, url, Some(body), None).await
    }
}
