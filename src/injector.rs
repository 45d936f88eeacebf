//! External long-running producers of synthetic traffic.

use std::sync::atomic::AtomicBool;

use crate::packet::Packet;
use crate::request::ControlRequest;

/// The capability an [`Injector`] is given to emit traffic into the
/// Manager. Implemented by the Manager itself; handed to injectors only
/// for the lifetime of their worker.
pub trait PacketSink: Send + Sync {
    /// Injects a fully-formed data packet. Its endpoint address's direction
    /// bit selects the in-queue or out-queue it lands on.
    fn inject(&self, packet: Packet) -> bool;

    /// Injects a device-to-host control request (no data from the caller;
    /// any reply arrives through the usual control relay path).
    fn inject_setup_in(&self, request: ControlRequest, filter: bool) -> bool;

    /// Injects a host-to-device control request carrying a data stage.
    fn inject_setup_out(&self, request: ControlRequest, data: Vec<u8>, filter: bool) -> bool;
}

/// A cooperative worker that synthesizes traffic for as long as the
/// Manager is relaying. An injector is spawned on its own thread during
/// `start_control_relaying` and joined during `stop_relaying`; it must
/// observe `halt` and return promptly once set, the same way a
/// [`crate::relayer::Relayer`] worker does.
pub trait Injector: Send + Sync {
    fn run(&self, sink: &dyn PacketSink, halt: &AtomicBool);
}
