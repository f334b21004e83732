use snafu::prelude::*;

use super::{DecodePacketError, EncodedPacket, Packet};

/// Packets are joined with the record separator control character
pub const SEPARATOR: char = '\x1e';

/// Max packets count in one payload, the wire format has no count prefix
pub const MAX_DECODE_PACKETS: usize = 16;

/// Error when decode a payload
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum DecodePayloadError {
    /// One of the packets can't be decoded
    #[snafu(display("malformed packet at index {index}: {source}"))]
    MalformedPacket {
        /// packet index in payload
        index: usize,
        /// source error
        source: DecodePacketError,
    },

    /// Payload has more packets than allowed
    #[snafu(display("too many packets in payload: {count} > {}", MAX_DECODE_PACKETS))]
    TooManyPackets {
        /// segment count
        count: usize,
    },

    /// `d=` form body has no `d` field
    #[snafu(display("jsonp form body has no d field"))]
    InvalidJsonpBody,
}

/// Ordered packets transmitted together as one HTTP body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload {
    packets: Vec<Packet>,
}

impl From<Packet> for Payload {
    fn from(packet: Packet) -> Self {
        Self {
            packets: vec![packet],
        }
    }
}

impl From<Vec<Packet>> for Payload {
    fn from(packets: Vec<Packet>) -> Self {
        Self { packets }
    }
}

impl IntoIterator for Payload {
    type Item = Packet;
    type IntoIter = std::vec::IntoIter<Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.into_iter()
    }
}

impl Payload {
    /// Create a payload
    pub fn new(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    /// packets in order
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// packet count
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check if there is no packet
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Encode all packets in text form, optionally wrapped as a JSONP callback
    pub fn encode(&self, jsonp_index: Option<u32>) -> String {
        let mut encoded = String::new();
        for packet in &self.packets {
            if !encoded.is_empty() {
                encoded.push(SEPARATOR);
            }
            match packet.encode(true) {
                EncodedPacket::Text(s) => encoded.push_str(&s),
                // b64 encoding never yields raw bytes
                EncodedPacket::Binary(_) => unreachable!(),
            }
        }

        match jsonp_index {
            Some(index) => {
                let escaped = encoded.replace('\\', "\\\\").replace('"', "\\\"");
                format!("___eio[{}]({});", index, escaped)
            }
            None => encoded,
        }
    }

    /// Decode a payload, accepting the `d=` url encoded form
    pub fn decode(encoded: &str) -> Result<Self, DecodePayloadError> {
        let form;
        let mut encoded = encoded;

        if encoded.starts_with("d=") {
            form = url::form_urlencoded::parse(encoded.as_bytes())
                .find(|(k, _)| k == "d")
                .map(|(_, v)| v.into_owned())
                .context(error::InvalidJsonpBody)?;
            encoded = &form;
        }

        let count = encoded.split(SEPARATOR).count();
        ensure!(
            count <= MAX_DECODE_PACKETS,
            error::TooManyPackets { count }
        );

        let packets = encoded
            .split(SEPARATOR)
            .enumerate()
            .map(|(index, s)| Packet::decode(s).context(error::MalformedPacket { index }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { packets })
    }
}

#[cfg(test)]
mod test {
    use bytes::Bytes;
    use serde_json::json;

    use super::*;
    use crate::gateway::packet::{PacketData, PacketType};

    fn packets(n: usize) -> Vec<Packet> {
        (0..n)
            .map(|i| match i % 3 {
                0 => Packet::event("chat", [json!(i)]),
                1 => Packet::ping(Some(&i.to_string())),
                _ => Packet::binary(Bytes::from(vec![i as u8])),
            })
            .collect()
    }

    #[test]
    fn test_payload_separator_count_and_order() {
        for n in 1..=MAX_DECODE_PACKETS {
            let payload = Payload::new(packets(n));
            let encoded = payload.encode(None);

            assert_eq!(encoded.matches(SEPARATOR).count(), n - 1);

            let decoded = Payload::decode(&encoded).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn test_payload_empty_encodes_to_empty_string() {
        assert_eq!(Payload::default().encode(None), "");
    }

    #[test]
    fn test_payload_decode_too_many_packets() {
        let encoded = vec!["6"; MAX_DECODE_PACKETS + 1].join("\x1e");

        assert!(matches!(
            Payload::decode(&encoded),
            Err(DecodePayloadError::TooManyPackets { count: 17 })
        ));
    }

    #[test]
    fn test_payload_decode_empty_is_malformed() {
        assert!(matches!(
            Payload::decode(""),
            Err(DecodePayloadError::MalformedPacket {
                index: 0,
                source: DecodePacketError::Empty
            })
        ));
    }

    #[test]
    fn test_payload_decode_reports_bad_index() {
        assert!(matches!(
            Payload::decode("6\x1e9\x1e6"),
            Err(DecodePayloadError::MalformedPacket { index: 1, .. })
        ));
    }

    #[test]
    fn test_payload_decode_handshake() {
        let payload = Payload::decode(
            "0{\"sid\":\"abc\",\"upgrades\":[],\"pingInterval\":25000,\"pingTimeout\":5000}\x1e40",
        )
        .unwrap();

        assert_eq!(payload.len(), 2);
        assert_eq!(payload.packets()[0].packet_type(), PacketType::Open);
        assert_eq!(payload.packets()[1].packet_type(), PacketType::Message);
    }

    #[test]
    fn test_payload_decode_form_encoded() {
        let payload = Payload::decode("d=42%5B%22chat%22%5D%1E2probe").unwrap();

        assert_eq!(payload.len(), 2);
        assert_eq!(
            payload.packets()[0].data(),
            Some(&PacketData::Json(json!(["chat"])))
        );
        assert!(payload.packets()[1].is_control_with_text(PacketType::Ping, "probe"));
    }

    #[test]
    fn test_payload_encode_jsonp() {
        let payload = Payload::new(vec![Packet::event("a", []), Packet::noop()]);

        assert_eq!(
            payload.encode(Some(3)),
            "___eio[3](42[\\\"a\\\"]\x1e6);"
        );
    }
}
