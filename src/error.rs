//! Error types for the USB relay core.

use crate::manager::ManagerStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes surfaced synchronously by the [`crate::manager::Manager`].
///
/// Transient per-packet failures (a single transfer timing out, a single
/// transport write failing) are never represented here, the [`crate::relayer`]
/// workers absorb those locally and retry, per the failure-handling policy.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to device proxy: {0}")]
    ProxyConnect(String),

    #[error("transport error on endpoint {endpoint:#04x}: {message}")]
    ProxyTransport { endpoint: u8, message: String },

    #[error("proxy reported a terminal disconnect")]
    ProxyDisconnect,

    #[error("operation requires status {expected}, manager is {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: ManagerStatus,
    },

    #[error("index {index} out of range (table has {len} entries)")]
    IndexOutOfRange { index: usize, len: usize },
}
