use bytes::Bytes;
use enum_as_inner::EnumAsInner;

/// Transport-control packet type, the first digit of every encoded packet
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Sent by server when a new session is opened, carries the handshake data
    Open,
    /// Request the close of this transport
    Close,
    /// Heartbeat probe
    Ping,
    /// Heartbeat answer
    Pong,
    /// Actual message, carries an application envelope
    Message,
    /// Sent by client before switching to the socket transport
    Upgrade,
    /// Used to force a polling cycle during upgrade
    Noop,
}

impl PacketType {
    /// Wire digit of this type
    pub fn digit(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Close => 1,
            Self::Ping => 2,
            Self::Pong => 3,
            Self::Message => 4,
            Self::Upgrade => 5,
            Self::Noop => 6,
        }
    }

    /// Type of a wire digit
    pub fn from_digit(d: u8) -> Option<Self> {
        match d {
            0 => Some(Self::Open),
            1 => Some(Self::Close),
            2 => Some(Self::Ping),
            3 => Some(Self::Pong),
            4 => Some(Self::Message),
            5 => Some(Self::Upgrade),
            6 => Some(Self::Noop),
            _ => None,
        }
    }

    /// Type name for logging
    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Message => "MESSAGE",
            Self::Upgrade => "UPGRADE",
            Self::Noop => "NOOP",
        }
    }
}

/// Application envelope type, the second digit of a MESSAGE packet
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Namespace connected
    Connect,
    /// Namespace disconnected
    Disconnect,
    /// Named event with arguments
    Event,
    /// Acknowledgement of an event with id
    Ack,
    /// Namespace connection refused
    Error,
    /// Event with binary attachments
    BinaryEvent,
    /// Acknowledgement with binary attachments
    BinaryAck,
}

impl MessageType {
    /// Wire digit of this type
    pub fn digit(self) -> u8 {
        match self {
            Self::Connect => 0,
            Self::Disconnect => 1,
            Self::Event => 2,
            Self::Ack => 3,
            Self::Error => 4,
            Self::BinaryEvent => 5,
            Self::BinaryAck => 6,
        }
    }

    /// Type of a wire digit
    pub fn from_digit(d: u8) -> Option<Self> {
        match d {
            0 => Some(Self::Connect),
            1 => Some(Self::Disconnect),
            2 => Some(Self::Event),
            3 => Some(Self::Ack),
            4 => Some(Self::Error),
            5 => Some(Self::BinaryEvent),
            6 => Some(Self::BinaryAck),
            _ => None,
        }
    }

    /// Whether the encoded form carries an attachment count prefix
    pub fn has_attachments(self) -> bool {
        matches!(self, Self::BinaryEvent | Self::BinaryAck)
    }
}

/// Data carried by a packet
#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum PacketData {
    /// Literal text, kept as is
    Text(String),
    /// Decoded json value
    Json(serde_json::Value),
    /// Opaque bytes, only legal in MESSAGE packets
    Binary(Bytes),
}

impl From<&str> for PacketData {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PacketData {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<serde_json::Value> for PacketData {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Bytes> for PacketData {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}
