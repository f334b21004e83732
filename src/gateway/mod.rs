//! Engine.IO style gateway: wire codec, transport negotiation and the live connection.

mod client;
mod connection;
pub mod packet;

pub use client::{Client, ConnectError};
pub use connection::{Gateway, GatewayState, PacketHandler, SessionError, TransportError};

use tokio_tungstenite as websocket;

pub(crate) type WebsocketClient =
    websocket::WebSocketStream<websocket::MaybeTlsStream<tokio::net::TcpStream>>;

/// Transport a gateway is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// repeated HTTP requests
    Polling,
    /// one persistent websocket
    Socket,
}

impl TransportKind {
    /// name used in the `transport` query parameter
    pub fn name(self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Socket => packet::WEBSOCKET_TRANSPORT,
        }
    }
}
