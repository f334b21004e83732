mod handshake;
mod init;
mod ready;
mod upgrade;

pub(super) use init::{error, ClientStateInit};

pub use init::ConnectError;

use tokio::sync::watch;

use crate::{gateway::GatewayState, http, Config};

#[derive(Debug)]
pub(crate) struct ClientInner<S> {
    pub state: S,
}

/// What every negotiation state carries
#[derive(Debug)]
pub(crate) struct Negotiation {
    pub config: Config,
    pub http: http::Client,
    pub state: watch::Sender<GatewayState>,
}

impl Negotiation {
    pub fn move_to(&self, state: GatewayState) {
        log::debug!("Move to {:?} state", state);
        self.state.send_replace(state);
    }
}
