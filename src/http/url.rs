//! Session and engine urls.

use std::{
    fmt::Display,
    str::FromStr,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use snafu::prelude::*;
use url::Url;

use crate::gateway::TransportKind;

/// Parse string as session url error
#[derive(Debug, Snafu)]
#[snafu(
    visibility(pub(crate)),
    module(parse_session_url_error_variant),
    context(suffix(false))
)]
pub enum ParseSessionURLError {
    #[snafu(display("{s} is an invalid url: {source}"))]
    /// the str is not a valid url
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url schema is neither http nor websocket
    #[snafu(display("the url {s} has invalid schema {schema}, only http(s) or ws(s) is ok"))]
    InvalidSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the parsed url has no host
    #[snafu(display("the session url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },
}

/// Session url handed out by the REST layer, like
/// `https://ssio10.nchat.naver.com:443?auth=...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionURL {
    url: Url,
}

impl SessionURL {
    /// Check if the session must use TLS
    pub fn is_secure(&self) -> bool {
        matches!(self.url.scheme(), "https" | "wss")
    }

    /// original url
    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// construct the engine url for a transport, keeping the session url's own
    /// query pairs
    pub fn engine_url(
        &self,
        path: &str,
        protocol_version: u8,
        transport: TransportKind,
        sid: Option<&str>,
    ) -> Url {
        let mut u = self.url.clone();

        let scheme = match (transport, self.is_secure()) {
            (TransportKind::Polling, true) => "https",
            (TransportKind::Polling, false) => "http",
            (TransportKind::Socket, true) => "wss",
            (TransportKind::Socket, false) => "ws",
        };
        // all four schemes are special, switching between them always works
        let _ = u.set_scheme(scheme);
        u.set_path(path);

        let kept = self
            .url
            .query_pairs()
            .filter(|(k, _)| !matches!(k.as_ref(), "EIO" | "transport" | "sid" | "t"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect::<Vec<_>>();

        u.set_query(None);
        {
            let mut query = u.query_pairs_mut();
            for (k, v) in kept.iter() {
                query.append_pair(k, v);
            }
            query.append_pair("EIO", &protocol_version.to_string());
            query.append_pair("transport", transport.name());
            if let Some(sid) = sid {
                query.append_pair("sid", sid);
            }
        }

        u
    }
}

impl FromStr for SessionURL {
    type Err = ParseSessionURLError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s)
            .with_context(|_| parse_session_url_error_variant::InvalidURL { s: s.to_string() })?;

        ensure!(
            matches!(url.scheme(), "http" | "https" | "ws" | "wss"),
            parse_session_url_error_variant::InvalidSchema {
                s,
                schema: url.scheme(),
            }
        );

        ensure!(
            url.host().is_some(),
            parse_session_url_error_variant::NoHost { s }
        );

        Ok(Self { url })
    }
}

impl Display for SessionURL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.url.fmt(f)
    }
}

static LAST_TIMESTAMP: AtomicU64 = AtomicU64::new(0);

fn fresh_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let prev = LAST_TIMESTAMP
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_default();

    now.max(prev + 1)
}

/// Copy of url with a strictly increasing `t` query parameter, defeats caching
pub fn with_timestamp(url: &Url) -> Url {
    let mut u = url.clone();
    u.query_pairs_mut()
        .append_pair("t", &fresh_timestamp().to_string());
    u
}
