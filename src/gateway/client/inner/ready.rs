use std::sync::Arc;

use super::{ClientInner, Negotiation};
use crate::gateway::{
    connection::Transport,
    packet::{HandshakeInfo, Packet, Payload},
    Gateway, PacketHandler,
};

#[derive(Debug)]
pub(crate) struct ClientStateReady {
    pub negotiation: Negotiation,
    pub info: HandshakeInfo,
    pub transport: Transport,
    pub extra: Vec<Packet>,
}

impl ClientInner<ClientStateReady> {
    /// Build the gateway, deliver handshake leftovers, then start the heartbeat
    pub async fn start(self, handler: Arc<dyn PacketHandler>) -> Gateway {
        let gateway = Gateway::new(
            self.state.info,
            self.state.transport,
            self.state.negotiation.state,
            handler,
        );

        gateway.deliver(Payload::new(self.state.extra)).await;
        gateway.start_heartbeat();

        log::info!(
            "Gateway connected, sid {}, transport {}",
            gateway.sid(),
            gateway.transport_kind().name()
        );

        gateway
    }
}
