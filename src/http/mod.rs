//! HTTP plumbing of the polling transport

mod client;
mod error;
pub mod url;

pub use client::Client;
pub use error::Error;

/// Result type for http module
pub type Result<T> = std::result::Result<T, Error>;
