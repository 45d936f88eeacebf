//! Tunables for the relay fleet.
//!
//! Loading these from an on-disk format is explicitly out of scope (§1):
//! callers construct a `ManagerConfig` however they like (hardcoded,
//! parsed from their own config file, CLI flags) and hand it to
//! [`crate::manager::Manager::new`].

use std::time::Duration;

/// Runtime tunables shared by every relay and injector the Manager spawns.
#[derive(Debug, Clone, Copy)]
pub struct ManagerConfig {
    /// How long a data relay blocks on a single proxy read before checking
    /// `halt` again. Kept short (single-digit milliseconds) to bound halt
    /// latency, per §4.5.
    pub receive_timeout: Duration,
    /// Starting sleep after the first consecutive transport error.
    pub backoff_floor: Duration,
    /// Ceiling the exponential backoff saturates at, per §4.5 step 6.
    pub backoff_cap: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            receive_timeout: Duration::from_millis(5),
            backoff_floor: Duration::from_millis(2),
            backoff_cap: Duration::from_millis(100),
        }
    }
}
