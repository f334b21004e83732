use std::time::Duration;

use snafu::prelude::*;

use super::{error, upgrade::ClientStateUpgrade, ClientInner, ConnectError, Negotiation};
use crate::{
    gateway::{
        packet::{HandshakeInfo, PacketData, PacketType, Payload},
        GatewayState, TransportKind,
    },
    http::url::{with_timestamp, SessionURL},
};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug)]
pub(crate) struct ClientStateHandshake {
    pub negotiation: Negotiation,
    pub url: SessionURL,
}

impl ClientInner<ClientStateHandshake> {
    pub async fn handshake(self) -> Result<ClientInner<ClientStateUpgrade>, ConnectError> {
        let negotiation = self.state.negotiation;
        negotiation.move_to(GatewayState::Handshaking);

        let config = &negotiation.config;
        let u = self.state.url.engine_url(
            &config.engine_path,
            config.protocol_version,
            TransportKind::Polling,
            None,
        );

        log::debug!("Handshaking: {}", u);

        let body = match negotiation
            .http
            .get(&with_timestamp(&u), Some(HANDSHAKE_TIMEOUT))
            .await
        {
            Ok(body) => body,
            Err(err) => {
                return match err.status() {
                    Some(status) => error::HandshakeFailed { status }.fail(),
                    None => Err(err).context(error::HandshakeRequest),
                }
            }
        };

        log::trace!("Handshake response: {:?}", body);

        let mut packets = Payload::decode(&body)
            .context(error::InvalidPayload)?
            .into_iter();

        // decoded payload always has at least one packet
        let open = packets.next().ok_or_else(|| {
            error::FirstPacketNotOpen {
                packet_type: PacketType::Noop,
            }
            .build()
        })?;

        ensure!(
            open.packet_type() == PacketType::Open,
            error::FirstPacketNotOpen {
                packet_type: open.packet_type()
            }
        );

        let info: HandshakeInfo = match open.data() {
            Some(PacketData::Json(v)) => serde_json::from_value(v.clone()),
            Some(PacketData::Text(s)) => serde_json::from_str(s),
            _ => serde_json::from_str(""),
        }
        .context(error::InvalidHandshake)?;

        log::debug!("Handshake info: {:?}", info);

        // the OPEN packet itself is delivered too, handlers track the sid with it
        let mut extra = vec![open];
        extra.extend(packets);
        if extra.len() > 1 {
            log::debug!("Handshake response carries {} more packets", extra.len() - 1);
        }

        Ok(ClientInner {
            state: ClientStateUpgrade {
                negotiation,
                url: self.state.url,
                info,
                extra,
            },
        })
    }
}
