use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the persistent socket transport in handshake upgrades
pub static WEBSOCKET_TRANSPORT: &str = "websocket";

/// Handshake data carried by the OPEN packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeInfo {
    /// session id issued by server
    pub sid: String,
    /// transports the server offers to upgrade to
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// heartbeat interval, in milliseconds
    pub ping_interval: u64,
    /// heartbeat acknowledgement timeout, in milliseconds
    pub ping_timeout: u64,
    /// max bytes of one payload the server accepts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload: Option<u64>,
}

impl HandshakeInfo {
    /// how often the client must emit a heartbeat
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval)
    }

    /// how long the client waits for a heartbeat acknowledgement
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout)
    }

    /// read deadline of one transport read
    pub fn read_deadline(&self) -> Duration {
        self.ping_interval() + self.ping_timeout()
    }

    /// Check if server offers the persistent socket transport
    pub fn can_upgrade(&self) -> bool {
        self.upgrades.iter().any(|u| u == WEBSOCKET_TRANSPORT)
    }
}
