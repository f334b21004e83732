use std::{sync::Arc, time::Duration};

use snafu::prelude::*;
use tokio_tungstenite::tungstenite;

use super::GatewayState;

/// Error of a connected session, every variant except `NotConnected` and
/// `HttpStatus` ends the session.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)), module(session_error), context(suffix(false)))]
pub enum SessionError {
    /// operation needs a connected gateway
    #[snafu(display("gateway is not connected, current state: {state:?}"))]
    NotConnected {
        /// state when operation is called
        state: GatewayState,
    },

    /// no PONG received in time
    #[snafu(display("no heartbeat acknowledgement in {timeout:?}"))]
    HeartbeatTimeout {
        /// ping timeout
        timeout: Duration,
    },

    /// underlying transport broken
    #[snafu(display("connection lost: {source}"))]
    ConnectionLost {
        /// source error
        source: TransportError,
    },

    /// server sent a CLOSE packet
    #[snafu(display("server closed the session"))]
    ServerClosed,

    /// server rejected a polling payload.
    ///
    /// A rejected heartbeat ping is not acknowledged, so it ends the session
    /// as [`SessionError::HeartbeatTimeout`].
    #[snafu(display("server responded http status {status} to sent payload"))]
    HttpStatus {
        /// received http status code
        status: reqwest::StatusCode,
    },
}

impl SessionError {
    /// Check if this error ended the session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NotConnected { .. } | Self::HttpStatus { .. })
    }
}

/// Error of the underlying transport
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)), module(transport_error), context(suffix(false)))]
pub enum TransportError {
    /// polling request failed
    #[snafu(display("http transport broken: {source}"))]
    Http {
        /// source error
        #[snafu(source(from(crate::http::Error, Arc::new)))]
        source: Arc<crate::http::Error>,
    },

    /// websocket read or write failed
    #[snafu(display("websocket transport broken: {source}"))]
    Websocket {
        /// source error
        #[snafu(source(from(tungstenite::Error, Arc::new)))]
        source: Arc<tungstenite::Error>,
    },

    /// nothing received before read deadline
    #[snafu(display("no data received in {deadline:?}"))]
    ReadTimeout {
        /// read deadline
        deadline: Duration,
    },

    /// websocket closed by peer
    #[snafu(display("websocket closed by peer"))]
    Closed,
}
