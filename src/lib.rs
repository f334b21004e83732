//! # chzzk-gateway
//!
//! Realtime session client for the Chzzk open API: an Engine.IO/Socket.IO style
//! gateway over HTTP long polling, upgraded to a websocket when the server offers it.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chzzk_gateway::{state::{Event, Handlers}, Config, Session};
//!
//! # async fn run(session_url: &str) -> chzzk_gateway::Result<()> {
//! let handlers = Handlers::new().on("chat", |event: Arc<Event>| async move {
//!     if let Some(chat) = event.as_chat() {
//!         println!("{}: {}", chat.profile.nickname, chat.content);
//!     }
//! });
//!
//! let session = Session::connect(session_url, handlers, Config::default()).await?;
//! let session_key = session.wait_until_connected().await?;
//! println!("subscribe events with session key {}", session_key);
//!
//! session.run().await
//! # }
//! ```

#![deny(clippy::all)]
#![warn(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod gateway;
pub mod http;
pub mod state;

mod error;
#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};

use std::{sync::Arc, time::Duration};

use snafu::prelude::*;

use gateway::{Gateway, GatewayState};
use state::{ConnectionState, Event, Filter, Handlers};

/// A gateway session and its dispatcher, the read loop runs in background.
#[derive(Debug)]
pub struct Session {
    gateway: Gateway,
    state: Arc<ConnectionState>,
}

impl Session {
    /// Connect to a session url handed out by the REST layer
    pub async fn connect(url: &str, handlers: Handlers, config: Config) -> Result<Self> {
        let state = Arc::new(ConnectionState::new(handlers, config.debug));

        let client = gateway::Client::new(config).context(error::Connect)?;

        log::info!("Connecting session gateway...");

        let gateway = client
            .connect(url, Arc::clone(&state) as Arc<dyn gateway::PacketHandler>)
            .await
            .context(error::Connect)?;

        gateway.spawn_reader();

        Ok(Self { gateway, state })
    }

    /// the gateway, for sending packets
    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// the dispatcher
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Wait until server reports the session ready, returning the session key
    pub async fn wait_until_connected(&self) -> Result<String> {
        self.state
            .wait_until_connected()
            .await
            .context(error::Wait)
    }

    /// Wait the first event of a name that passes the filter
    pub async fn wait_for<F>(
        &self,
        event: &str,
        filter: F,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>>
    where
        F: Filter + Send + Sync + 'static,
    {
        self.state
            .wait_for(event, filter, timeout)
            .await
            .context(error::Wait)
    }

    /// Wait until the session ends, `Ok` when it ends by [`Session::disconnect`]
    pub async fn run(&self) -> Result<()> {
        let mut rx = self.gateway.watch_state();
        while *rx.borrow_and_update() != GatewayState::Disconnected {
            if rx.changed().await.is_err() {
                break;
            }
        }

        match self.gateway.end_reason() {
            Some(err) => Err(err).context(error::Session),
            None => Ok(()),
        }
    }

    /// Disconnect the session
    pub async fn disconnect(&self) {
        self.gateway.disconnect().await
    }
}
