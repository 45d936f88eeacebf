//! Interfaces to the two transport-facing shims this crate treats as
//! external collaborators: the Device Proxy (speaks to the physical
//! device) and the Host Proxy (presents a device to the host). Only their
//! contracts are pinned here; concrete implementations live elsewhere.

use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::EndpointRef;
use crate::error::Result;
use crate::model::{Configuration, DeviceModel};
use crate::packet::{Packet, SetupPacket};

/// Speaks to the physical USB device (libusb-style transfers).
pub trait DeviceProxy: Send + Sync {
    fn connect(&self) -> Result<()>;
    fn disconnect(&self);

    /// Enumerates the connected device and returns a snapshot model of it.
    fn build_device_model(&self) -> Result<Arc<dyn DeviceModel>>;

    fn send(&self, endpoint: &EndpointRef, packet: Packet) -> Result<()>;

    /// Blocks for at most `timeout` waiting for a transfer. Returns `Ok(None)`
    /// on a plain timeout (not an error); returns `Err` for transport errors
    /// and terminal disconnects.
    fn receive(&self, endpoint: &EndpointRef, timeout: Duration) -> Result<Option<Packet>>;

    /// Forwards a control transaction to the device and blocks for its
    /// response (control transfers are inherently request/response).
    fn send_setup(&self, setup: &SetupPacket) -> Result<SetupPacket>;

    fn claim_interface(&self, interface_number: u8) -> Result<()>;
    fn release_interface(&self, interface_number: u8) -> Result<()>;

    /// Applies a configuration, honoring the high-speed/device-qualifier
    /// pairing: `qualifier_alt` is the configuration the device would run
    /// under the *other* speed, present only when the device exposes a
    /// device qualifier descriptor.
    fn set_config(
        &self,
        primary: &Configuration,
        qualifier_alt: Option<&Configuration>,
        highspeed: bool,
    ) -> Result<()>;
}

/// Presents a device to the upstream host (gadget/UDC-style).
pub trait HostProxy: Send + Sync {
    fn connect(&self, device: &dyn DeviceModel) -> Result<()>;
    fn disconnect(&self);

    fn send(&self, endpoint: &EndpointRef, packet: Packet) -> Result<()>;
    fn receive(&self, endpoint: &EndpointRef, timeout: Duration) -> Result<Option<Packet>>;

    /// Blocks for at most `timeout` waiting for the host to start a control
    /// transaction on EP0. Returns the complete setup stage plus any
    /// OUT data stage.
    fn receive_control(&self, timeout: Duration) -> Result<Option<SetupPacket>>;

    /// Completes a control transaction by delivering the (possibly
    /// filter-mutated) response back to the host.
    fn complete_control(&self, response: SetupPacket) -> Result<()>;

    fn set_config(
        &self,
        primary: &Configuration,
        qualifier_alt: Option<&Configuration>,
        highspeed: bool,
    ) -> Result<()>;
}
