use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::{
    self as websocket,
    tungstenite::{self, client::IntoClientRequest, Message as Frame},
};

use super::{ready::ClientStateReady, ClientInner, Negotiation};
use crate::{
    gateway::{
        connection::{frame, Transport},
        packet::{HandshakeInfo, Packet, PacketType},
        GatewayState, TransportKind, WebsocketClient,
    },
    http::url::SessionURL,
};

/// Error when probe the persistent socket, the session stays on polling
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub(crate) enum UpgradeError {
    #[snafu(display("build socket request failed: {source}"))]
    Request { source: tungstenite::Error },

    #[snafu(display("connect socket {url} failed: {source}"))]
    Connect {
        url: String,
        source: tungstenite::Error,
    },

    #[snafu(display("send {what} packet failed: {source}"))]
    SendPacket {
        what: &'static str,
        source: tungstenite::Error,
    },

    #[snafu(display("receive probe reply failed: {source}"))]
    Receive { source: tungstenite::Error },

    #[snafu(display("socket closed before probe reply"))]
    Closed,

    #[snafu(display("no probe reply in {timeout:?}"))]
    Timeout { timeout: Duration },

    #[snafu(display("probe reply is {received:?} instead of pong"))]
    NoPong { received: String },
}

#[derive(Debug)]
pub(crate) struct ClientStateUpgrade {
    pub negotiation: Negotiation,
    pub url: SessionURL,
    pub info: HandshakeInfo,
    pub extra: Vec<Packet>,
}

fn is_probe_pong(reply: &Frame) -> bool {
    match reply {
        Frame::Text(text) => Packet::decode(text)
            .map(|p| p.is_control_with_text(PacketType::Pong, "probe"))
            .unwrap_or(false),
        _ => false,
    }
}

impl ClientInner<ClientStateUpgrade> {
    async fn probe(&self) -> Result<WebsocketClient, UpgradeError> {
        let config = &self.state.negotiation.config;
        let u = self.state.url.engine_url(
            &config.engine_path,
            config.protocol_version,
            TransportKind::Socket,
            Some(&self.state.info.sid),
        );

        log::debug!("Probing socket: {}", u);

        let mut request = u.as_str().into_client_request().context(error::Request)?;
        request
            .headers_mut()
            .extend(self.state.negotiation.http.socket_headers());

        let (mut ws, _) = websocket::connect_async(request)
            .await
            .with_context(|_| error::Connect { url: u.as_str() })?;

        ws.send(frame(&Packet::ping(Some("probe"))))
            .await
            .context(error::SendPacket { what: "probe" })?;

        let timeout = self.state.info.ping_timeout();
        let reply = match tokio::time::timeout(timeout, ws.next()).await {
            Err(_) => return error::Timeout { timeout }.fail(),
            Ok(None) => return error::Closed.fail(),
            Ok(Some(result)) => result.context(error::Receive)?,
        };

        log::trace!("Probe reply: {:?}", reply);

        ensure!(
            is_probe_pong(&reply),
            error::NoPong {
                received: reply.to_string()
            }
        );

        ws.send(frame(&Packet::upgrade()))
            .await
            .context(error::SendPacket { what: "upgrade" })?;

        Ok(ws)
    }

    /// Try the socket upgrade, every failure falls back to polling
    pub async fn upgrade(self) -> ClientInner<ClientStateReady> {
        let negotiation = &self.state.negotiation;

        let ws = if !negotiation.config.upgrade {
            log::debug!("Socket upgrade disabled by config");
            None
        } else if !self.state.info.can_upgrade() {
            log::debug!("Server offers no socket upgrade");
            None
        } else {
            negotiation.move_to(GatewayState::Upgrading);
            match self.probe().await {
                Ok(ws) => Some(ws),
                Err(err) => {
                    log::warn!("Socket upgrade failed, stay on polling: {}", err);
                    None
                }
            }
        };

        let transport = match ws {
            Some(ws) => Transport::socket(ws),
            None => {
                let config = &negotiation.config;
                let u = self.state.url.engine_url(
                    &config.engine_path,
                    config.protocol_version,
                    TransportKind::Polling,
                    Some(&self.state.info.sid),
                );
                Transport::polling(negotiation.http.clone(), u)
            }
        };

        ClientInner {
            state: ClientStateReady {
                negotiation: self.state.negotiation,
                info: self.state.info,
                transport,
                extra: self.state.extra,
            },
        }
    }
}
