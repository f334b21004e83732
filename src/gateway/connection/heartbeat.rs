use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{watch, Notify},
    time::Instant,
};

use super::{session_error, SessionError};

/// Flags shared by the reader and the heartbeat worker
#[derive(Debug)]
pub(crate) struct Liveness {
    alive: AtomicBool,
    acked: AtomicBool,
    notify: Notify,
}

impl Liveness {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            acked: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    /// Start waiting for a new acknowledgement
    pub fn arm(&self) {
        self.acked.store(false, Ordering::Release);
    }

    /// Called by the reader when a PONG arrives
    pub fn ack(&self) {
        self.acked.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Resolve once the last armed ping is acknowledged
    pub async fn acked(&self) {
        loop {
            if self.acked.load(Ordering::Acquire) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// Something the heartbeat worker keeps alive
#[async_trait]
pub(crate) trait HeartbeatTarget: Send + Sync + 'static {
    fn liveness(&self) -> &Liveness;

    /// Write a PING, an error means the session already ended
    async fn send_ping(&self) -> Result<(), SessionError>;
}

#[derive(Debug)]
pub(crate) struct HeartbeatWorker<T> {
    target: Arc<T>,
    interval: Duration,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl<T> HeartbeatWorker<T>
where
    T: HeartbeatTarget + Debug,
{
    pub fn new(
        target: Arc<T>,
        interval: Duration,
        timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            target,
            interval,
            timeout,
            shutdown,
        }
    }

    /// Run until shutdown is signaled, a write fails or a ping is not
    /// acknowledged in time.
    pub async fn run(mut self) -> Result<(), SessionError> {
        log::debug!(
            "Heartbeat worker start, interval {:?}, timeout {:?}",
            self.interval,
            self.timeout
        );

        let mut next_ping = Instant::now() + self.interval;

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    log::debug!("Heartbeat worker receive shutdown signal when wait next ping");
                    if changed.is_err() {
                        break
                    }
                    continue
                }

                _ = tokio::time::sleep_until(next_ping) => {}
            }

            let liveness = self.target.liveness();
            liveness.arm();

            log::trace!("Send heartbeat ping");
            match self.target.send_ping().await {
                Ok(()) => {}
                // a rejected ping gets no PONG, the deadline below ends the session
                Err(SessionError::HttpStatus { status }) => {
                    log::warn!("Heartbeat ping rejected with http status {}", status);
                }
                Err(err) => {
                    log::debug!("Send heartbeat ping failed: {}, stop", err);
                    return Err(err);
                }
            }

            let deadline = Instant::now() + self.timeout;

            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    log::debug!("Heartbeat worker receive shutdown signal when wait pong");
                    if changed.is_err() {
                        break
                    }
                    continue
                }

                _ = liveness.acked() => {
                    log::trace!("Heartbeat acknowledged");
                }

                _ = tokio::time::sleep_until(deadline) => {
                    log::warn!("No heartbeat acknowledgement in {:?}", self.timeout);
                    return session_error::HeartbeatTimeout { timeout: self.timeout }.fail();
                }
            }

            next_ping += self.interval;
        }

        log::debug!("Heartbeat worker stop");

        Ok(())
    }
}
