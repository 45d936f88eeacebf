//! Per-endpoint relay workers.
//!
//! A [`Relayer`] owns one endpoint-direction's relay loop (or, for EP0,
//! the whole control transaction loop). The Manager exclusively owns every
//! `Relayer`; exactly one worker thread borrows it for the duration of a
//! session.

mod backoff;
pub mod control;
pub mod data;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::ManagerConfig;
use crate::endpoint::EndpointRef;
use crate::filter::FilterChain;
use crate::packet::{Packet, SetupPacket};
use crate::proxy::{DeviceProxy, HostProxy};
use crate::queue::RelayQueue;

pub use control::ConfigurationObserver;

/// What a relay worker reports once it has exited, inspected by the
/// Manager after `join()`.
#[derive(Debug, Clone, Copy)]
pub struct RelayerOutcome {
    /// Set when the worker exited because a proxy reported a terminal
    /// disconnect, as opposed to a clean `halt`-triggered exit.
    pub dead: bool,
}

/// A spawned relay worker plus the plumbing needed to stop it.
///
/// `start()` is implicit in construction, a `Relayer` only exists while
/// running, matching the spec's "worker task exists iff status is X"
/// invariant (§3): the Manager never keeps an un-started `Relayer` value
/// around, it keeps the queue and filter chain until it is ready to spawn.
pub struct Relayer {
    endpoint: EndpointRef,
    halt: Arc<AtomicBool>,
    join: Option<JoinHandle<RelayerOutcome>>,
}

impl Relayer {
    pub fn spawn_data(
        endpoint: EndpointRef,
        device_proxy: Arc<dyn DeviceProxy>,
        host_proxy: Arc<dyn HostProxy>,
        inbound: Arc<RelayQueue<Packet>>,
        filters: FilterChain,
        config: ManagerConfig,
    ) -> Self {
        let halt = Arc::new(AtomicBool::new(false));
        let worker_halt = Arc::clone(&halt);
        let join = thread::Builder::new()
            .name(format!("usbrelay-ep{:#04x}", endpoint.address()))
            .spawn(move || {
                data::run(
                    endpoint,
                    device_proxy,
                    host_proxy,
                    inbound,
                    filters,
                    worker_halt,
                    config,
                )
            })
            .expect("failed to spawn relay worker thread");

        Relayer {
            endpoint,
            halt,
            join: Some(join),
        }
    }

    pub fn spawn_control(
        endpoint: EndpointRef,
        device_proxy: Arc<dyn DeviceProxy>,
        host_proxy: Arc<dyn HostProxy>,
        inbound: Arc<RelayQueue<SetupPacket>>,
        filters: FilterChain,
        observer: Arc<dyn ConfigurationObserver>,
        config: ManagerConfig,
    ) -> Self {
        let halt = Arc::new(AtomicBool::new(false));
        let worker_halt = Arc::clone(&halt);
        let join = thread::Builder::new()
            .name("usbrelay-ep0".to_string())
            .spawn(move || {
                control::run(
                    device_proxy,
                    host_proxy,
                    inbound,
                    filters,
                    observer,
                    worker_halt,
                    config,
                )
            })
            .expect("failed to spawn control relay worker thread");

        Relayer {
            endpoint,
            halt,
            join: Some(join),
        }
    }

    pub fn endpoint(&self) -> EndpointRef {
        self.endpoint
    }

    /// Cooperative stop signal; the worker observes this between
    /// iterations, never mid-transfer.
    pub fn signal_halt(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }

    /// Blocks until the worker has exited and returns what it reported.
    /// Idempotent in the sense that calling it once is the only legal use,
    /// `Relayer` is consumed by teardown, matching "owned exclusively by
    /// the Manager, borrowed by exactly one worker".
    pub fn join(mut self) -> RelayerOutcome {
        match self.join.take() {
            Some(handle) => handle.join().unwrap_or(RelayerOutcome { dead: true }),
            None => RelayerOutcome { dead: false },
        }
    }
}

impl Drop for Relayer {
    fn drop(&mut self) {
        // Teardown is expected to call `join()` explicitly; this is a
        // last-resort safety net so a Relayer dropped without a prior
        // `stop_relaying()` (e.g. a test fixture going out of scope) does
        // not leave a detached thread racing the rest of the process.
        if let Some(handle) = self.join.take() {
            self.halt.store(true, Ordering::SeqCst);
            let _ = handle.join();
        }
    }
}
