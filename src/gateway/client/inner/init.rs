use std::sync::Arc;

use snafu::prelude::*;
use tokio::sync::watch;

use super::{handshake::ClientStateHandshake, ClientInner, Negotiation};
use crate::{
    gateway::{
        packet::{DecodePayloadError, PacketType},
        Gateway, GatewayState, PacketHandler,
    },
    http::{self, url::ParseSessionURLError},
    Config,
};

/// Error when connect to a session gateway
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConnectError {
    /// session url can't be used
    #[snafu(display("invalid session url: {source}"))]
    InvalidUrl {
        /// source error
        source: ParseSessionURLError,
    },

    /// create http client from config failed
    #[snafu(display("create http client failed: {source}"))]
    HttpClient {
        /// source error
        source: http::Error,
    },

    /// handshake request answered with a non 2xx status
    #[snafu(display("handshake failed with http status {status}"))]
    HandshakeFailed {
        /// received http status code
        status: reqwest::StatusCode,
    },

    /// handshake request not answered
    #[snafu(display("send handshake request failed: {source}"))]
    HandshakeRequest {
        /// source error
        source: http::Error,
    },

    /// handshake response body is not a valid payload
    #[snafu(display("handshake response is not a valid payload: {source}"))]
    InvalidPayload {
        /// source error
        source: DecodePayloadError,
    },

    /// first packet of handshake response is not OPEN
    #[snafu(display("first handshake packet is {} instead of open", packet_type.name()))]
    FirstPacketNotOpen {
        /// received packet type
        packet_type: PacketType,
    },

    /// OPEN packet data is not handshake info
    #[snafu(display("invalid handshake data: {source}"))]
    InvalidHandshake {
        /// source error
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub(crate) struct ClientStateInit {
    pub negotiation: Negotiation,
}

impl ClientStateInit {
    pub fn new(config: Config, http: http::Client) -> Self {
        let (state, _) = watch::channel(GatewayState::Connecting);

        Self {
            negotiation: Negotiation {
                config,
                http,
                state,
            },
        }
    }
}

impl ClientInner<ClientStateInit> {
    pub async fn run(
        self,
        url: &str,
        handler: Arc<dyn PacketHandler>,
    ) -> Result<Gateway, ConnectError> {
        let gateway = self
            .into_handshake(url)?
            .handshake()
            .await?
            .upgrade()
            .await
            .start(handler)
            .await;

        Ok(gateway)
    }

    pub(crate) fn into_handshake(
        self,
        url: &str,
    ) -> Result<ClientInner<ClientStateHandshake>, ConnectError> {
        let url = url.parse().context(error::InvalidUrl)?;

        log::debug!("Session url: {}", url);

        Ok(ClientInner {
            state: ClientStateHandshake {
                negotiation: self.state.negotiation,
                url,
            },
        })
    }
}
