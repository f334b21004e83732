//! Gateway configuration.

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// engine request path
    pub engine_path: String,
    /// `EIO` protocol version query parameter
    pub protocol_version: u8,
    /// value of the `Authorization` header sent with every request
    pub authorization: Option<String>,
    /// user agent of http requests
    pub user_agent: String,
    /// try to upgrade to the persistent socket transport when offered
    pub upgrade: bool,
    /// dispatch unhandled and protocol level events too
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_path: "/socket.io/".to_string(),
            protocol_version: 4,
            authorization: None,
            user_agent: APP_USER_AGENT.to_string(),
            upgrade: true,
            debug: false,
        }
    }
}

impl Config {
    /// Set engine request path
    pub fn engine_path<S: Into<String>>(mut self, path: S) -> Self {
        self.engine_path = path.into();
        self
    }

    /// Set `EIO` protocol version
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set authorization header value, like `Bearer <token>`
    pub fn authorization<S: Into<String>>(mut self, value: S) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set user agent
    pub fn user_agent<S: Into<String>>(mut self, ua: S) -> Self {
        self.user_agent = ua.into();
        self
    }

    /// Enable or disable the socket upgrade
    pub fn upgrade(mut self, enable: bool) -> Self {
        self.upgrade = enable;
        self
    }

    /// Enable or disable debug events
    pub fn debug(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }
}
