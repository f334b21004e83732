//! The live gateway connection.

mod error;
mod heartbeat;
mod transport;

pub use error::{SessionError, TransportError};

pub(crate) use error::session_error;
pub(crate) use transport::{frame, Transport};

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::Value;
use snafu::prelude::*;
use tokio::{sync::watch, task::JoinHandle};

use super::{
    packet::{HandshakeInfo, Packet, PacketType, Payload},
    TransportKind,
};
use heartbeat::{HeartbeatTarget, HeartbeatWorker, Liveness};

/// Max time spent on the best-effort goodbye packets of [`Gateway::disconnect`]
const GOODBYE_TIMEOUT: Duration = Duration::from_secs(3);

/// Lifecycle state of a gateway connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// building http client and urls
    Connecting,
    /// waiting the OPEN packet
    Handshaking,
    /// probing the persistent socket
    Upgrading,
    /// session running on the transport
    Connected(TransportKind),
    /// caller requested disconnect, goodbye packets in flight
    Disconnecting,
    /// session ended
    Disconnected,
}

/// Receiver of everything a gateway reads
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// A packet was read, called in wire order
    async fn on_packet(&self, packet: Packet);

    /// The session ended, called exactly once.
    ///
    /// `reason` is `None` when the caller requested the disconnect.
    async fn on_session_end(&self, reason: Option<SessionError>);
}

pub(crate) struct Shared {
    info: HandshakeInfo,
    transport: Transport,
    state: watch::Sender<GatewayState>,
    liveness: Liveness,
    shutdown: watch::Sender<bool>,
    ended: AtomicBool,
    end_reason: Mutex<Option<SessionError>>,
    handler: Arc<dyn PacketHandler>,
}

impl Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("info", &self.info)
            .field("transport", &self.transport)
            .field("state", &*self.state.borrow())
            .field("liveness", &self.liveness)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HeartbeatTarget for Shared {
    fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    async fn send_ping(&self) -> Result<(), SessionError> {
        self.write(Packet::ping(None).into()).await
    }
}

impl Shared {
    fn state(&self) -> GatewayState {
        *self.state.borrow()
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        let state = self.state();
        ensure!(
            matches!(state, GatewayState::Connected(_)),
            session_error::NotConnected { state }
        );
        Ok(())
    }

    async fn write(&self, payload: Payload) -> Result<(), SessionError> {
        self.ensure_connected()?;

        match self.transport.write(payload).await {
            Err(err) if err.is_fatal() => {
                self.finish(Some(err.clone())).await;
                Err(err)
            }
            result => result,
        }
    }

    async fn read_once(&self) -> Result<(), SessionError> {
        self.ensure_connected()?;

        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return session_error::NotConnected { state: self.state() }.fail();
        }

        let result = tokio::select! {
            biased;

            _ = shutdown.changed() => {
                log::debug!("Read cancelled by shutdown signal");
                return session_error::NotConnected { state: self.state() }.fail();
            }

            result = self.transport.read(self.info.read_deadline()) => result,
        };

        match result {
            Ok(payload) => {
                self.handle_payload(payload).await;
                Ok(())
            }
            Err(err) => {
                self.finish(Some(err.clone())).await;
                Err(err)
            }
        }
    }

    async fn read_loop(&self) {
        log::debug!("Read loop start");
        while self.read_once().await.is_ok() {}
        log::debug!("Read loop stop");
    }

    pub(crate) async fn handle_payload(&self, payload: Payload) {
        for packet in payload {
            log::trace!("Received {} packet", packet.packet_type().name());

            let packet_type = packet.packet_type();
            match packet_type {
                PacketType::Pong => self.liveness.ack(),
                PacketType::Ping => {
                    let pong = Packet::new(PacketType::Pong, packet.data().cloned())
                        .unwrap_or_else(|_| Packet::pong(None));
                    if let Err(err) = self.write(pong.into()).await {
                        log::warn!("Answer server ping failed: {}", err);
                    }
                }
                _ => {}
            }

            self.handler.on_packet(packet).await;

            if packet_type == PacketType::Close {
                self.finish(Some(session_error::ServerClosed.build())).await;
                break;
            }
        }
    }

    /// End the session once.
    ///
    /// An error reason is ignored when the caller already started a disconnect.
    async fn finish(&self, reason: Option<SessionError>) {
        let claimed = self.state.send_if_modified(|state| match *state {
            GatewayState::Disconnected => false,
            GatewayState::Disconnecting if reason.is_some() => false,
            _ => {
                *state = GatewayState::Disconnecting;
                true
            }
        });

        if !claimed || self.ended.swap(true, Ordering::AcqRel) {
            return;
        }

        match reason {
            Some(ref err) => log::warn!("Session ended: {}", err),
            None => log::info!("Session disconnected"),
        }

        self.liveness.set_alive(false);
        self.shutdown.send_replace(true);
        *self
            .end_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = reason.clone();

        self.transport.close().await;

        log::debug!("Move to disconnected state");
        self.state.send_replace(GatewayState::Disconnected);

        self.handler.on_session_end(reason).await;
    }
}

#[derive(Debug, Default)]
struct Tasks {
    heartbeat: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

/// A connected gateway session
#[derive(Debug)]
pub struct Gateway {
    shared: Arc<Shared>,
    tasks: Mutex<Tasks>,
}

impl Gateway {
    pub(crate) fn new(
        info: HandshakeInfo,
        transport: Transport,
        state: watch::Sender<GatewayState>,
        handler: Arc<dyn PacketHandler>,
    ) -> Self {
        let kind = transport.kind();

        log::debug!("Move to connected state on {} transport", kind.name());
        state.send_replace(GatewayState::Connected(kind));

        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                info,
                transport,
                state,
                liveness: Liveness::new(),
                shutdown,
                ended: AtomicBool::new(false),
                end_reason: Mutex::new(None),
                handler,
            }),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver packets read before the gateway existed
    pub(crate) async fn deliver(&self, payload: Payload) {
        if !payload.is_empty() {
            self.shared.handle_payload(payload).await;
        }
    }

    pub(crate) fn start_heartbeat(&self) {
        let shared = Arc::clone(&self.shared);
        let worker = HeartbeatWorker::new(
            Arc::clone(&shared),
            shared.info.ping_interval(),
            shared.info.ping_timeout(),
            shared.shutdown.subscribe(),
        );

        let handle = tokio::spawn(async move {
            if let Err(err) = worker.run().await {
                shared.finish(Some(err)).await;
            }
        });

        self.tasks().heartbeat.replace(handle);
    }

    /// Handshake data of this session
    pub fn info(&self) -> &HandshakeInfo {
        &self.shared.info
    }

    /// Session id
    pub fn sid(&self) -> &str {
        &self.shared.info.sid
    }

    /// Transport the session runs on
    pub fn transport_kind(&self) -> TransportKind {
        self.shared.transport.kind()
    }

    /// Current lifecycle state
    pub fn state(&self) -> GatewayState {
        self.shared.state()
    }

    /// Observe lifecycle state changes
    pub fn watch_state(&self) -> watch::Receiver<GatewayState> {
        self.shared.state.subscribe()
    }

    /// Check if the session is live
    pub fn is_alive(&self) -> bool {
        self.shared.liveness.is_alive()
    }

    /// Why the session ended, `None` while running or after a requested disconnect
    pub fn end_reason(&self) -> Option<SessionError> {
        self.shared
            .end_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send packets in one transport write.
    ///
    /// A rejected polling payload is returned as [`SessionError::HttpStatus`]
    /// and keeps the session, other write errors end it.
    pub async fn send<P: Into<Payload>>(&self, payload: P) -> Result<(), SessionError> {
        self.shared.write(payload.into()).await
    }

    /// Send an EVENT envelope `["event", args...]`
    pub async fn emit<I>(&self, event: &str, args: I) -> Result<(), SessionError>
    where
        I: IntoIterator<Item = Value>,
    {
        self.send(Packet::event(event, args)).await
    }

    /// Read and handle one unit of data from the transport
    pub async fn read_once(&self) -> Result<(), SessionError> {
        self.shared.read_once().await
    }

    /// Run the read loop in a background task
    pub fn spawn_reader(&self) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move { shared.read_loop().await });

        if let Some(old) = self.tasks().reader.replace(handle) {
            old.abort();
        }
    }

    /// Run the read loop until the session ends, returning the end reason
    pub async fn run(&self) -> Option<SessionError> {
        self.shared.read_loop().await;
        self.end_reason()
    }

    /// Disconnect the session.
    ///
    /// The heartbeat worker is stopped before anything else, so no PING is
    /// written after this starts. Always ends in [`GatewayState::Disconnected`].
    pub async fn disconnect(&self) {
        let claimed = self.shared.state.send_if_modified(|state| match *state {
            GatewayState::Disconnecting | GatewayState::Disconnected => false,
            _ => {
                *state = GatewayState::Disconnecting;
                true
            }
        });

        if !claimed {
            log::debug!("Session already ending, wait it");
            let mut rx = self.shared.state.subscribe();
            while *rx.borrow_and_update() != GatewayState::Disconnected {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            return;
        }

        log::debug!("Move to disconnecting state");

        self.shared.shutdown.send_replace(true);

        let (heartbeat, reader) = {
            let mut tasks = self.tasks();
            (tasks.heartbeat.take(), tasks.reader.take())
        };
        if let Some(handle) = heartbeat {
            handle.abort();
            let _ = handle.await;
            log::debug!("Heartbeat worker stopped");
        }
        if let Some(handle) = reader {
            handle.abort();
        }

        let goodbye = Payload::new(vec![Packet::disconnect(), Packet::close()]);
        match tokio::time::timeout(GOODBYE_TIMEOUT, self.shared.transport.write(goodbye)).await {
            Ok(Ok(())) => log::debug!("Goodbye packets sent"),
            Ok(Err(err)) => log::debug!("Send goodbye packets failed: {}", err),
            Err(_) => log::debug!("Send goodbye packets timeout"),
        }

        self.shared.finish(None).await;
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
        let mut tasks = self.tasks();
        for handle in [tasks.heartbeat.take(), tasks.reader.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}
