//! crate level error types

use snafu::prelude::*;

use crate::{
    gateway::{ConnectError, SessionError},
    state::WaitError,
};

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Connect gateway failed
    #[snafu(display("connect gateway failed: {source}"))]
    Connect {
        /// source error
        source: ConnectError,
    },

    /// Session ended with error
    #[snafu(display("session ended: {source}"))]
    Session {
        /// source error
        source: SessionError,
    },

    /// Wait an event failed
    #[snafu(display("wait event failed: {source}"))]
    Wait {
        /// source error
        source: WaitError,
    },
}
