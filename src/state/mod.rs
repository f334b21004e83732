//! Connection state: turns gateway packets into typed events.

mod event;
pub mod filter;
mod parser;
mod subscriber;

pub use event::{
    ChatMessage, DispatchError, Donation, DonationType, Event, Permission, Profile, SocketEvent,
    SystemMessage,
};
pub use filter::{Filter, FilterExt};
pub use subscriber::{Handlers, Subscriber};

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use snafu::prelude::*;
use tokio::sync::{oneshot, watch};

use crate::gateway::{
    packet::{MessageType, Packet, PacketData, PacketType},
    PacketHandler, SessionError,
};

/// Error when wait an event
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(wait_error), context(suffix(false)))]
pub enum WaitError {
    /// no matching event in time
    #[snafu(display("wait event {event} timeout after {timeout:?}"))]
    Timeout {
        /// event name
        event: String,
        /// wait timeout
        timeout: Duration,
    },

    /// session ended before the event came
    #[snafu(display("session ended when wait event {event}"))]
    SessionEnded {
        /// event name
        event: String,
    },
}

struct Waiter {
    filter: Box<dyn Filter + Send + Sync>,
    tx: oneshot::Sender<Arc<Event>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Waiting,
    Connected(String),
    Ended,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    gateway_sid: Option<String>,
    socket_sid: Option<String>,
}

/// Dispatcher of one gateway session.
///
/// Every event is delivered to the first matching waiter of its name, then to
/// every subscriber of its name.
pub struct ConnectionState {
    handlers: Handlers,
    debug: bool,
    waiters: Mutex<HashMap<&'static str, Vec<Waiter>>>,
    bookkeeping: Mutex<Bookkeeping>,
    readiness: watch::Sender<Readiness>,
    ended: AtomicBool,
}

impl Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionState")
            .field("handlers", &self.handlers)
            .field("debug", &self.debug)
            .field("bookkeeping", &*lock(&self.bookkeeping))
            .field("readiness", &*self.readiness.borrow())
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionState {
    /// Create a dispatcher, `debug` enables the protocol level events
    pub fn new(handlers: Handlers, debug: bool) -> Self {
        let (readiness, _) = watch::channel(Readiness::Waiting);

        Self {
            handlers,
            debug,
            waiters: Mutex::new(HashMap::new()),
            bookkeeping: Mutex::new(Bookkeeping::default()),
            readiness,
            ended: AtomicBool::new(false),
        }
    }

    /// engine session id, from the OPEN packet
    pub fn gateway_sid(&self) -> Option<String> {
        lock(&self.bookkeeping).gateway_sid.clone()
    }

    /// namespace session id, from the CONNECT envelope
    pub fn socket_sid(&self) -> Option<String> {
        lock(&self.bookkeeping).socket_sid.clone()
    }

    /// session key reported by the `connected` system event
    pub fn session_key(&self) -> Option<String> {
        match *self.readiness.borrow() {
            Readiness::Connected(ref key) => Some(key.clone()),
            _ => None,
        }
    }

    /// Wait until server reports the session ready, returning the session key
    pub async fn wait_until_connected(&self) -> Result<String, WaitError> {
        let mut rx = self.readiness.subscribe();

        loop {
            let readiness = rx.borrow_and_update().clone();
            match readiness {
                Readiness::Connected(key) => return Ok(key),
                Readiness::Ended => {
                    return wait_error::SessionEnded { event: "connect" }.fail()
                }
                Readiness::Waiting => {}
            }

            if rx.changed().await.is_err() {
                return wait_error::SessionEnded { event: "connect" }.fail();
            }
        }
    }

    /// Wait the first event of a name that passes the filter.
    ///
    /// A timed out wait is dropped without affecting other waiters.
    pub async fn wait_for<F>(
        &self,
        event: &str,
        filter: F,
        timeout: Option<Duration>,
    ) -> Result<Arc<Event>, WaitError>
    where
        F: Filter + Send + Sync + 'static,
    {
        let name = event.to_lowercase();
        let key = match known_event_name(&name) {
            Some(key) => key,
            None => {
                log::warn!("Wait unknown event {}, it never comes", name);
                return match timeout {
                    Some(timeout) => {
                        tokio::time::sleep(timeout).await;
                        wait_error::Timeout { event: name, timeout }.fail()
                    }
                    None => std::future::pending().await,
                };
            }
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = lock(&self.waiters);
            ensure!(
                !self.ended.load(Ordering::Acquire),
                wait_error::SessionEnded { event: &name }
            );
            waiters.entry(key).or_default().push(Waiter {
                filter: Box::new(filter),
                tx,
            });
        }

        log::trace!("Waiter registered for event {}", name);

        let result = match timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    self.drop_closed_waiters(key);
                    return wait_error::Timeout { event: name, timeout }.fail();
                }
            },
            None => rx.await.ok(),
        };

        result.context(wait_error::SessionEnded { event: name })
    }

    fn drop_closed_waiters(&self, key: &str) {
        if let Some(waiters) = lock(&self.waiters).get_mut(key) {
            waiters.retain(|w| !w.tx.is_closed());
        }
    }

    fn dispatch(&self, event: Event) {
        let event = Arc::new(event);
        let name = event.name();

        log::debug!("Dispatching event {}", name);

        {
            let mut waiters = lock(&self.waiters);
            if let Some(list) = waiters.get_mut(name) {
                list.retain(|w| !w.tx.is_closed());
                if let Some(index) = list.iter().position(|w| w.filter.filter_event(&event)) {
                    let waiter = list.remove(index);
                    let _ = waiter.tx.send(Arc::clone(&event));
                }
            }
        }

        self.handlers.dispatch(&event);
    }

    fn on_event(&self, data: Option<PacketData>) {
        let (name, args) = match parser::split_envelope(data) {
            Ok(v) => v,
            Err(err) => {
                log::warn!("Drop invalid event envelope: {}", err);
                self.dispatch(Event::Error(err));
                return;
            }
        };

        if self.debug {
            self.dispatch(Event::SocketEvent(SocketEvent {
                name: name.clone(),
                args: args.clone(),
            }));
        }

        let parser = match parser::find(&name) {
            Some(p) => p,
            None => {
                log::trace!("Ignore unhandled event {}", name);
                return;
            }
        };

        match parser(&name, args) {
            Ok(event) => {
                if let Event::Connect(ref key) = event {
                    log::debug!("Session connected with key {}", key);
                    self.readiness
                        .send_replace(Readiness::Connected(key.clone()));
                }
                self.dispatch(event)
            }
            Err(err) => {
                log::warn!("Decode event {} failed: {}", name, err);
                self.dispatch(Event::Error(err))
            }
        }
    }

    fn on_open(&self, data: Option<&PacketData>) {
        let sid = match data {
            Some(PacketData::Json(v)) => v.get("sid").and_then(|s| s.as_str()).map(String::from),
            _ => None,
        };

        log::debug!("Engine session opened, sid {:?}", sid);

        lock(&self.bookkeeping).gateway_sid = sid.clone();

        if let (true, Some(sid)) = (self.debug, sid) {
            self.dispatch(Event::EngineConnect(sid));
        }
    }

    fn on_socket_connect(&self, data: Option<&PacketData>) {
        let sid = match data {
            Some(PacketData::Json(v)) => v.get("sid").and_then(|s| s.as_str()).map(String::from),
            _ => None,
        };

        log::debug!("Namespace connected, sid {:?}", sid);

        lock(&self.bookkeeping).socket_sid = sid.clone();

        if self.debug {
            self.dispatch(Event::SocketConnect(sid));
        }
    }

    fn on_socket_disconnect(&self) {
        log::debug!("Namespace disconnected");

        *lock(&self.bookkeeping) = Bookkeeping::default();

        if self.debug {
            self.dispatch(Event::SocketDisconnect);
        }
    }
}

fn known_event_name(name: &str) -> Option<&'static str> {
    const NAMES: &[&str] = &[
        "connect",
        "chat",
        "donation",
        "subscribed",
        "unsubscribed",
        "revoked",
        "engine_connect",
        "socket_connect",
        "socket_disconnect",
        "socket_event",
        "disconnect",
        "error",
    ];

    NAMES.iter().find(|n| **n == name).copied()
}

#[async_trait]
impl PacketHandler for ConnectionState {
    async fn on_packet(&self, packet: Packet) {
        match (packet.packet_type(), packet.message_type()) {
            (PacketType::Open, _) => self.on_open(packet.data()),
            (PacketType::Message, Some(MessageType::Event)) => self.on_event(packet.into_data()),
            (PacketType::Message, Some(MessageType::Connect)) => {
                self.on_socket_connect(packet.data())
            }
            (PacketType::Message, Some(MessageType::Disconnect)) => self.on_socket_disconnect(),
            (packet_type, message_type) => log::trace!(
                "Ignore {} packet, envelope {:?}",
                packet_type.name(),
                message_type
            ),
        }
    }

    async fn on_session_end(&self, reason: Option<SessionError>) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }

        self.readiness.send_if_modified(|r| {
            if matches!(r, Readiness::Connected(_)) {
                false
            } else {
                *r = Readiness::Ended;
                true
            }
        });

        self.dispatch(Event::Disconnected(reason));

        // nothing can be dispatched anymore, wake every waiter
        lock(&self.waiters).clear();
    }
}
