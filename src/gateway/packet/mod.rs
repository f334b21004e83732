//! Engine.IO / Socket.IO packet and payload codec.

mod handshake;
mod payload;
mod types;

pub use handshake::{HandshakeInfo, WEBSOCKET_TRANSPORT};
pub use payload::{DecodePayloadError, Payload, MAX_DECODE_PACKETS};
pub use types::{MessageType, PacketData, PacketType};

use base64::Engine as _;
use bytes::Bytes;
use enum_as_inner::EnumAsInner;
use serde_json::Value;
use snafu::prelude::*;

static DEFAULT_NAMESPACE: &str = "/";

/// Error when decode wire data as a packet
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum DecodePacketError {
    /// Nothing to decode
    #[snafu(display("invalid empty packet received"))]
    Empty,

    /// Leading character is not a known packet type digit
    #[snafu(display("unknown packet type {found:?}"))]
    UnknownPacketType {
        /// the leading character
        found: char,
    },

    /// MESSAGE packet has no envelope type digit
    #[snafu(display("message packet has no envelope type"))]
    MissingMessageType,

    /// Envelope type digit is unknown
    #[snafu(display("unknown message envelope type {found:?}"))]
    UnknownMessageType {
        /// the envelope character
        found: char,
    },

    /// Packet id does not fit into u64
    #[snafu(display("invalid packet id {id}: {source}"))]
    InvalidPacketId {
        /// id digits
        id: String,
        /// source error
        source: std::num::ParseIntError,
    },

    /// Envelope body is not valid json
    #[snafu(display("invalid json body {body:?}: {source}"))]
    InvalidJsonBody {
        /// the body
        body: String,
        /// source error
        source: serde_json::Error,
    },

    /// Envelope body is a bare number, which can't be told apart from a packet id
    #[snafu(display("message envelope body {body} is a bare number"))]
    NumericBody {
        /// the body
        body: String,
    },

    /// `b` prefixed binary packet is not valid base64
    #[snafu(display("invalid base64 binary packet: {source}"))]
    InvalidBase64 {
        /// source error
        source: base64::DecodeError,
    },
}

/// Error when construct a packet that can't be encoded faithfully
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(invalid), context(suffix(false)))]
pub enum InvalidPacketError {
    /// Binary data in a packet other than MESSAGE
    #[snafu(display("binary data is only allowed in MESSAGE packets, got {}", packet_type.name()))]
    BinaryNotMessage {
        /// the packet type
        packet_type: PacketType,
    },

    /// MESSAGE packet without envelope and without binary data
    #[snafu(display("non-binary MESSAGE packet needs an envelope type"))]
    NoEnvelope,

    /// Namespace does not start with `/`, or contains `,` or a `?` query
    #[snafu(display("invalid namespace {namespace:?}"))]
    InvalidNamespace {
        /// the namespace
        namespace: String,
    },

    /// Envelope data is a bare number
    #[snafu(display("message envelope data can't be a bare number: {value}"))]
    NumericData {
        /// the value
        value: Value,
    },
}

/// A packet encoded for one of the transports
#[derive(Debug, Clone, PartialEq, Eq, EnumAsInner)]
pub enum EncodedPacket {
    /// Text form, used by polling and by socket text frames
    Text(String),
    /// Raw binary form, socket binary frames only
    Binary(Bytes),
}

/// One framed wire unit, a transport-control packet optionally carrying an
/// application envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    packet_type: PacketType,
    message_type: Option<MessageType>,
    id: Option<u64>,
    namespace: Option<String>,
    data: Option<PacketData>,
}

impl Packet {
    /// Create a control packet, or a binary MESSAGE packet.
    ///
    /// Text that is itself a json array or object is stored as json, scalar
    /// json values are stored as their text form.
    pub fn new(
        packet_type: PacketType,
        data: Option<PacketData>,
    ) -> Result<Self, InvalidPacketError> {
        let data = match data {
            Some(PacketData::Binary(b)) => {
                ensure!(
                    packet_type == PacketType::Message,
                    invalid::BinaryNotMessage { packet_type }
                );
                Some(PacketData::Binary(b))
            }
            Some(PacketData::Text(s)) => text_data(s),
            Some(PacketData::Json(v)) => json_data(v),
            None => None,
        };

        ensure!(
            packet_type != PacketType::Message || matches!(data, Some(PacketData::Binary(_))),
            invalid::NoEnvelope
        );

        Ok(Self {
            packet_type,
            message_type: None,
            id: None,
            namespace: None,
            data,
        })
    }

    /// Create a MESSAGE packet carrying an application envelope
    pub fn message(
        message_type: MessageType,
        namespace: Option<&str>,
        id: Option<u64>,
        data: Option<Value>,
    ) -> Result<Self, InvalidPacketError> {
        let namespace = match namespace {
            None => None,
            Some(ns) if ns == DEFAULT_NAMESPACE => None,
            Some(ns) => {
                ensure!(
                    ns.starts_with('/') && !ns.contains(|c: char| c == ',' || c == '?'),
                    invalid::InvalidNamespace { namespace: ns }
                );
                Some(ns.to_string())
            }
        };

        if let Some(value) = data.as_ref().filter(|v| v.is_number()) {
            return invalid::NumericData {
                value: value.clone(),
            }
            .fail();
        }

        Ok(Self {
            packet_type: PacketType::Message,
            message_type: Some(message_type),
            id,
            namespace,
            data: data.map(PacketData::Json),
        })
    }

    fn control(packet_type: PacketType, data: Option<&str>) -> Self {
        Self {
            packet_type,
            message_type: None,
            id: None,
            namespace: None,
            data: data.and_then(|s| text_data(s.to_string())),
        }
    }

    /// Binary MESSAGE packet
    pub fn binary(data: Bytes) -> Self {
        Self {
            packet_type: PacketType::Message,
            message_type: None,
            id: None,
            namespace: None,
            data: Some(PacketData::Binary(data)),
        }
    }

    /// PING packet
    pub fn ping(data: Option<&str>) -> Self {
        Self::control(PacketType::Ping, data)
    }

    /// PONG packet
    pub fn pong(data: Option<&str>) -> Self {
        Self::control(PacketType::Pong, data)
    }

    /// CLOSE packet
    pub fn close() -> Self {
        Self::control(PacketType::Close, None)
    }

    /// UPGRADE packet
    pub fn upgrade() -> Self {
        Self::control(PacketType::Upgrade, None)
    }

    /// NOOP packet
    pub fn noop() -> Self {
        Self::control(PacketType::Noop, None)
    }

    /// Envelope DISCONNECT packet for the default namespace
    pub fn disconnect() -> Self {
        Self {
            packet_type: PacketType::Message,
            message_type: Some(MessageType::Disconnect),
            id: None,
            namespace: None,
            data: None,
        }
    }

    /// Envelope EVENT packet for the default namespace, `["name", args...]`
    pub fn event<I>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut data = vec![Value::String(name.to_string())];
        data.extend(args);

        Self {
            packet_type: PacketType::Message,
            message_type: Some(MessageType::Event),
            id: None,
            namespace: None,
            data: Some(PacketData::Json(Value::Array(data))),
        }
    }

    /// transport-control type
    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    /// application envelope type, MESSAGE packets only
    pub fn message_type(&self) -> Option<MessageType> {
        self.message_type
    }

    /// acknowledgement id
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// namespace, `None` for the default one
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// packet data
    pub fn data(&self) -> Option<&PacketData> {
        self.data.as_ref()
    }

    /// take packet data
    pub fn into_data(self) -> Option<PacketData> {
        self.data
    }

    /// Check if this packet carries binary data
    pub fn is_binary(&self) -> bool {
        matches!(self.data, Some(PacketData::Binary(_)))
    }

    /// Check if this is a PING/PONG packet carrying `data` as text
    pub fn is_control_with_text(&self, packet_type: PacketType, text: &str) -> bool {
        self.packet_type == packet_type
            && matches!(&self.data, Some(PacketData::Text(t)) if t == text)
    }

    /// Encode this packet.
    ///
    /// Binary packets become `b` + base64 text when `b64` is set, raw bytes
    /// otherwise.
    pub fn encode(&self, b64: bool) -> EncodedPacket {
        if let Some(PacketData::Binary(ref bytes)) = self.data {
            return if b64 {
                EncodedPacket::Text(format!(
                    "b{}",
                    base64::engine::general_purpose::STANDARD.encode(bytes)
                ))
            } else {
                EncodedPacket::Binary(bytes.clone())
            };
        }

        let mut encoded = self.packet_type.digit().to_string();

        if let Some(message_type) = self.message_type {
            encoded.push(char::from(b'0' + message_type.digit()));
            if message_type.has_attachments() {
                encoded.push_str("0-");
            }

            let mut needs_comma = false;
            if let Some(ref ns) = self.namespace {
                encoded.push_str(ns);
                needs_comma = true;
            }
            if let Some(id) = self.id {
                if needs_comma {
                    encoded.push(',');
                    needs_comma = false;
                }
                encoded.push_str(&id.to_string());
            }
            if let Some(PacketData::Json(ref value)) = self.data {
                if needs_comma {
                    encoded.push(',');
                }
                encoded.push_str(&value.to_string());
            }
        } else {
            match self.data {
                Some(PacketData::Text(ref s)) => encoded.push_str(s),
                Some(PacketData::Json(ref v)) => encoded.push_str(&v.to_string()),
                _ => {}
            }
        }

        EncodedPacket::Text(encoded)
    }

    /// Decode a raw binary frame
    pub fn decode_binary(data: Bytes) -> Self {
        Self::binary(data)
    }

    /// Decode a text packet
    pub fn decode(encoded: &str) -> Result<Self, DecodePacketError> {
        let first = encoded.chars().next().context(error::Empty)?;

        if first == 'b' {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&encoded[1..])
                .context(error::InvalidBase64)?;
            return Ok(Self::binary(bytes.into()));
        }

        let packet_type = first
            .to_digit(10)
            .and_then(|d| PacketType::from_digit(d as u8))
            .context(error::UnknownPacketType { found: first })?;

        let rest = &encoded[first.len_utf8()..];

        if packet_type == PacketType::Message {
            return Self::decode_envelope(rest);
        }

        Ok(Self::control(packet_type, Some(rest)))
    }

    fn decode_envelope(encoded: &str) -> Result<Self, DecodePacketError> {
        let first = encoded.chars().next().context(error::MissingMessageType)?;
        let message_type = first
            .to_digit(10)
            .and_then(|d| MessageType::from_digit(d as u8))
            .context(error::UnknownMessageType { found: first })?;

        let mut rest = &encoded[1..];

        // attachment count, attachments themselves are not reassembled
        if message_type.has_attachments() {
            if let Some(dash) = rest.find('-') {
                if dash > 0 && rest[..dash].bytes().all(|b| b.is_ascii_digit()) {
                    rest = &rest[dash + 1..];
                }
            }
        }

        let mut namespace = None;
        if rest.starts_with('/') {
            let (ns, remain) = match rest.find(',') {
                Some(sep) => (&rest[..sep], &rest[sep + 1..]),
                None => (rest, ""),
            };
            let ns = ns.split('?').next().unwrap_or(ns);
            if ns != DEFAULT_NAMESPACE {
                namespace = Some(ns.to_string());
            }
            rest = remain;
        }

        let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
        let id = if digits > 0 {
            let id = &rest[..digits];
            rest = &rest[digits..];
            Some(id.parse().context(error::InvalidPacketId { id })?)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            let value: Value =
                serde_json::from_str(rest).context(error::InvalidJsonBody { body: rest })?;
            ensure!(!value.is_number(), error::NumericBody { body: rest });
            Some(PacketData::Json(value))
        };

        Ok(Self {
            packet_type: PacketType::Message,
            message_type: Some(message_type),
            id,
            namespace,
            data,
        })
    }
}

fn text_data(s: String) -> Option<PacketData> {
    if s.is_empty() {
        return None;
    }
    // only structured values count as json, a bare number like `3123` stays text
    match serde_json::from_str::<Value>(&s) {
        Ok(v) if v.is_array() || v.is_object() => Some(PacketData::Json(v)),
        _ => Some(PacketData::Text(s)),
    }
}

fn json_data(v: Value) -> Option<PacketData> {
    match v {
        Value::Null => None,
        Value::String(s) => text_data(s),
        Value::Array(_) | Value::Object(_) => Some(PacketData::Json(v)),
        other => text_data(other.to_string()),
    }
}

#[cfg(test)]
mod test {
    mod decode {
        use super::super::*;
        use serde_json::json;

        #[test]
        fn test_packet_decode_open() {
            let packet =
                Packet::decode(r#"0{"sid":"abc","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":5000}"#)
                    .unwrap();

            assert_eq!(packet.packet_type(), PacketType::Open);
            assert_eq!(packet.message_type(), None);
            let data = packet.data().unwrap().as_json().unwrap();
            assert_eq!(data["sid"], "abc");
        }

        #[test]
        fn test_packet_decode_ping_probe() {
            let packet = Packet::decode("2probe").unwrap();

            assert!(packet.is_control_with_text(PacketType::Ping, "probe"));
        }

        #[test]
        fn test_packet_decode_bare_integer_is_text() {
            let packet = Packet::decode("3123").unwrap();

            assert_eq!(packet.packet_type(), PacketType::Pong);
            assert_eq!(
                packet.data(),
                Some(&PacketData::Text("123".to_string()))
            );
        }

        #[test]
        fn test_packet_decode_event() {
            let packet = Packet::decode(r#"42["chat",{"content":"hi"}]"#).unwrap();

            assert_eq!(packet.packet_type(), PacketType::Message);
            assert_eq!(packet.message_type(), Some(MessageType::Event));
            assert_eq!(packet.namespace(), None);
            assert_eq!(packet.id(), None);
            assert_eq!(
                packet.data(),
                Some(&PacketData::Json(json!(["chat", {"content": "hi"}])))
            );
        }

        #[test]
        fn test_packet_decode_namespace_and_id() {
            let packet = Packet::decode(r#"42/admin?token=1,12["ping"]"#).unwrap();

            assert_eq!(packet.namespace(), Some("/admin"));
            assert_eq!(packet.id(), Some(12));
            assert_eq!(packet.data(), Some(&PacketData::Json(json!(["ping"]))));
        }

        #[test]
        fn test_packet_decode_namespace_only() {
            let packet = Packet::decode("40/admin").unwrap();

            assert_eq!(packet.message_type(), Some(MessageType::Connect));
            assert_eq!(packet.namespace(), Some("/admin"));
            assert_eq!(packet.data(), None);
        }

        #[test]
        fn test_packet_decode_connect_with_sid() {
            let packet = Packet::decode(r#"40{"sid":"xyz"}"#).unwrap();

            assert_eq!(packet.message_type(), Some(MessageType::Connect));
            assert_eq!(packet.data(), Some(&PacketData::Json(json!({"sid": "xyz"}))));
        }

        #[test]
        fn test_packet_decode_binary_event_skips_attachment_count() {
            let packet = Packet::decode(r#"451-["file",{"_placeholder":true,"num":0}]"#).unwrap();

            assert_eq!(packet.message_type(), Some(MessageType::BinaryEvent));
            assert_eq!(
                packet.data(),
                Some(&PacketData::Json(json!(["file", {"_placeholder": true, "num": 0}])))
            );
        }

        #[test]
        fn test_packet_decode_base64_binary() {
            let packet = Packet::decode("bAQID").unwrap();

            assert_eq!(packet.packet_type(), PacketType::Message);
            assert_eq!(
                packet.data(),
                Some(&PacketData::Binary(Bytes::from_static(&[1, 2, 3])))
            );
        }

        #[test]
        fn test_packet_decode_errors() {
            assert!(matches!(Packet::decode(""), Err(DecodePacketError::Empty)));
            assert!(matches!(
                Packet::decode("9"),
                Err(DecodePacketError::UnknownPacketType { found: '9' })
            ));
            assert!(matches!(
                Packet::decode("x"),
                Err(DecodePacketError::UnknownPacketType { found: 'x' })
            ));
            assert!(matches!(
                Packet::decode("4"),
                Err(DecodePacketError::MissingMessageType)
            ));
            assert!(matches!(
                Packet::decode("4x"),
                Err(DecodePacketError::UnknownMessageType { found: 'x' })
            ));
            assert!(matches!(
                Packet::decode("42[oops"),
                Err(DecodePacketError::InvalidJsonBody { .. })
            ));
            assert!(matches!(
                Packet::decode("4299999999999999999999"),
                Err(DecodePacketError::InvalidPacketId { .. })
            ));
            assert!(matches!(
                Packet::decode("b!!"),
                Err(DecodePacketError::InvalidBase64 { .. })
            ));
        }
    }

    mod encode {
        use super::super::*;
        use serde_json::json;

        #[test]
        fn test_packet_encode_control() {
            assert_eq!(
                Packet::ping(Some("probe")).encode(false),
                EncodedPacket::Text("2probe".to_string())
            );
            assert_eq!(
                Packet::upgrade().encode(false),
                EncodedPacket::Text("5".to_string())
            );
            assert_eq!(
                Packet::close().encode(true),
                EncodedPacket::Text("1".to_string())
            );
        }

        #[test]
        fn test_packet_encode_envelope() {
            let packet = Packet::message(
                MessageType::Event,
                Some("/admin"),
                Some(7),
                Some(json!(["hello", 1])),
            )
            .unwrap();

            assert_eq!(
                packet.encode(false).into_text().unwrap(),
                r#"42/admin,7["hello",1]"#
            );

            assert_eq!(
                Packet::event("hello", [json!("world")]).encode(false),
                EncodedPacket::Text(r#"42["hello","world"]"#.to_string())
            );
            assert_eq!(
                Packet::disconnect().encode(false),
                EncodedPacket::Text("41".to_string())
            );
        }

        #[test]
        fn test_packet_encode_default_namespace_omitted() {
            let packet = Packet::message(MessageType::Connect, Some("/"), None, None).unwrap();

            assert_eq!(packet.namespace(), None);
            assert_eq!(packet.encode(false).into_text().unwrap(), "40");
        }

        #[test]
        fn test_packet_encode_binary() {
            let packet = Packet::binary(Bytes::from_static(&[1, 2, 3]));

            assert_eq!(packet.encode(true), EncodedPacket::Text("bAQID".to_string()));
            assert_eq!(
                packet.encode(false),
                EncodedPacket::Binary(Bytes::from_static(&[1, 2, 3]))
            );
        }

        #[test]
        fn test_packet_construct_invalid() {
            assert!(matches!(
                Packet::new(PacketType::Ping, Some(PacketData::Binary(Bytes::new()))),
                Err(InvalidPacketError::BinaryNotMessage {
                    packet_type: PacketType::Ping
                })
            ));
            assert!(matches!(
                Packet::new(PacketType::Message, Some("text".into())),
                Err(InvalidPacketError::NoEnvelope)
            ));
            assert!(matches!(
                Packet::message(MessageType::Event, Some("admin"), None, None),
                Err(InvalidPacketError::InvalidNamespace { .. })
            ));
            assert!(matches!(
                Packet::message(MessageType::Event, Some("/a?x=1"), None, Some(json!(["e"]))),
                Err(InvalidPacketError::InvalidNamespace { .. })
            ));
            assert!(matches!(
                Packet::message(MessageType::Ack, None, Some(1), Some(json!(5))),
                Err(InvalidPacketError::NumericData { .. })
            ));
        }
    }

    mod round_trip {
        use super::super::*;
        use serde_json::json;

        fn constructible() -> Vec<Packet> {
            vec![
                Packet::new(PacketType::Open, Some(json!({"sid": "abc", "upgrades": []}).into()))
                    .unwrap(),
                Packet::close(),
                Packet::ping(None),
                Packet::ping(Some("probe")),
                Packet::pong(Some("probe")),
                Packet::new(PacketType::Pong, Some(json!([1, 2]).into())).unwrap(),
                Packet::upgrade(),
                Packet::noop(),
                Packet::binary(Bytes::from_static(b"\x00\xffraw")),
                Packet::disconnect(),
                Packet::event("chat", [json!("{\"content\":\"hi\"}")]),
                Packet::message(MessageType::Connect, Some("/admin"), None, None).unwrap(),
                Packet::message(MessageType::Connect, None, None, Some(json!({"token": "t"})))
                    .unwrap(),
                Packet::message(MessageType::Ack, Some("/admin"), Some(42), Some(json!([])))
                    .unwrap(),
                Packet::message(MessageType::Ack, None, Some(3), None).unwrap(),
                Packet::message(MessageType::Error, None, None, Some(json!("refused"))).unwrap(),
                Packet::message(MessageType::BinaryEvent, None, Some(9), Some(json!(["f"])))
                    .unwrap(),
                Packet::message(MessageType::BinaryAck, Some("/x"), None, Some(json!(true)))
                    .unwrap(),
            ]
        }

        #[test]
        fn test_packet_round_trip() {
            for packet in constructible() {
                for b64 in [true, false] {
                    let decoded = match packet.encode(b64) {
                        EncodedPacket::Text(s) => Packet::decode(&s).unwrap(),
                        EncodedPacket::Binary(b) => Packet::decode_binary(b),
                    };
                    assert_eq!(decoded, packet, "b64 = {}", b64);
                }
            }
        }

        #[test]
        fn test_packet_text_normalized_on_construct() {
            let packet = Packet::new(PacketType::Ping, Some("[1]".into())).unwrap();

            assert_eq!(packet.data(), Some(&PacketData::Json(json!([1]))));

            let packet = Packet::new(PacketType::Ping, Some(json!("probe").into())).unwrap();

            assert_eq!(packet, Packet::ping(Some("probe")));
        }
    }
}
