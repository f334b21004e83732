//! Transport negotiation, turns a session url into a connected [`Gateway`].

mod inner;

pub use inner::ConnectError;

use std::sync::Arc;

use snafu::prelude::*;

use super::{Gateway, PacketHandler};
use crate::{http, Config};
use inner::{error, ClientInner, ClientStateInit};

/// Gateway client, negotiates a transport with the server: an HTTP polling
/// handshake first, then an optional upgrade to a persistent websocket.
///
/// There is no automatic reconnect, call [`Client::connect`] again when a
/// session ends.
#[derive(Debug, Clone)]
pub struct Client {
    config: Config,
    http: http::Client,
}

impl Client {
    /// Create a new client
    pub fn new(config: Config) -> Result<Self, ConnectError> {
        let http = http::Client::new(&config).context(error::HttpClient)?;

        log::debug!("Create gateway client with config: {:?}", config);

        Ok(Self { config, http })
    }

    /// configuration of this client
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect to the session url, every packet read from the returned gateway
    /// is delivered to `handler`.
    ///
    /// Packets carried by the handshake response are delivered before this returns.
    pub async fn connect(
        &self,
        url: &str,
        handler: Arc<dyn PacketHandler>,
    ) -> Result<Gateway, ConnectError> {
        ClientInner {
            state: ClientStateInit::new(self.config.clone(), self.http.clone()),
        }
        .run(url, handler)
        .await
    }
}
