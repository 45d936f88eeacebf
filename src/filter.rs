//! The pluggable filter chain.
//!
//! Filters are registered on the Manager while it is `Idle` and bound to
//! individual relays during `SETUP`/`start_data_relaying` based on their
//! `test_*` predicates. Binding is ordered: for a given relay, filters run
//! in registration order, the first `Drop` halts delivery, and `Replace`
//! substitutes the packet and continues down the chain.

use std::sync::Arc;

use crate::endpoint::EndpointRef;
use crate::model::{Configuration, DeviceModel, Interface};
use crate::packet::{Packet, SetupPacket};

/// The outcome of running one filter over one packet.
#[derive(Debug, Clone)]
pub enum Action<T> {
    Pass,
    Drop,
    Replace(T),
}

/// A pluggable observer/mutator in the per-endpoint pipeline.
///
/// The spec's distinction between Manager-owned and caller-borrowed
/// filters is expressed in Rust as `Arc<dyn Filter>`: a caller that wants
/// to retain a handle clones the `Arc` before registering it, a caller
/// that wants to hand off ownership registers the only clone there is.
/// Either way the Manager holds exactly the shared reference it needs.
pub trait Filter: Send + Sync {
    fn test_device(&self, _device: &dyn DeviceModel) -> bool {
        true
    }
    fn test_configuration(&self, _configuration: &Configuration) -> bool {
        true
    }
    fn test_interface(&self, _interface: &Interface) -> bool {
        true
    }
    fn test_endpoint(&self, _endpoint: &EndpointRef) -> bool {
        true
    }

    fn filter_packet(&self, packet: &Packet) -> Action<Packet> {
        let _ = packet;
        Action::Pass
    }

    fn filter_setup(&self, setup: &SetupPacket) -> Action<SetupPacket> {
        let _ = setup;
        Action::Pass
    }
}

/// The ordered set of filters bound to one relay.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        FilterChain {
            filters: Vec::new(),
        }
    }

    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs the chain over a data packet. Returns `None` if some filter
    /// dropped it, `Some(packet)` (possibly replaced) otherwise.
    pub fn apply_packet(&self, mut packet: Packet) -> Option<Packet> {
        for filter in &self.filters {
            match filter.filter_packet(&packet) {
                Action::Pass => {}
                Action::Drop => return None,
                Action::Replace(replacement) => packet = replacement,
            }
        }
        Some(packet)
    }

    /// Runs the chain over a setup packet, same semantics as `apply_packet`.
    pub fn apply_setup(&self, mut setup: SetupPacket) -> Option<SetupPacket> {
        for filter in &self.filters {
            match filter.filter_setup(&setup) {
                Action::Pass => {}
                Action::Drop => return None,
                Action::Replace(replacement) => setup = replacement,
            }
        }
        Some(setup)
    }
}
