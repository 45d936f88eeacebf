//! The EP0 control relay loop.
//!
//! Control is inherently request/response: one iteration reads a complete
//! setup transaction (setup stage plus optional data stage) and, unless a
//! filter drops it, completes it before the next one begins. `Relayer`
//! never holds a back-pointer to the Manager, `SET_CONFIGURATION`
//! handling is expressed through the narrow [`ConfigurationObserver`]
//! capability passed in at construction (§9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use super::backoff::Backoff;
use super::RelayerOutcome;
use crate::config::ManagerConfig;
use crate::error::Error;
use crate::filter::FilterChain;
use crate::packet::SetupPacket;
use crate::proxy::{DeviceProxy, HostProxy};
use crate::queue::RelayQueue;

/// Narrow callback capability the control relayer uses to tell the Manager
/// about configuration/interface changes it observed on the wire, without
/// holding a full back-reference to the Manager's mutable state.
pub trait ConfigurationObserver: Send + Sync {
    /// Called synchronously when a `SET_CONFIGURATION` request is about to
    /// be acknowledged to the host. Must apply the configuration to both
    /// proxies and rebuild the data-relay topology before returning, the
    /// control relayer acknowledges the transfer only after this returns.
    fn on_set_configuration(&self, index: u8);

    /// Called after a `SET_INTERFACE` request has been forwarded
    /// unchanged to the device, for observers that merely want to be
    /// informed (no topology change is implied).
    fn on_set_interface(&self, _interface_number: u8, _alternate_setting: u8) {}
}

pub fn run(
    device_proxy: Arc<dyn DeviceProxy>,
    host_proxy: Arc<dyn HostProxy>,
    inbound: Arc<RelayQueue<SetupPacket>>,
    filters: FilterChain,
    observer: Arc<dyn ConfigurationObserver>,
    halt: Arc<AtomicBool>,
    config: ManagerConfig,
) -> RelayerOutcome {
    let mut backoff = Backoff::new(config.backoff_floor, config.backoff_cap);

    loop {
        if halt.load(Ordering::Relaxed) {
            return RelayerOutcome { dead: false };
        }

        let setup = if let Some(setup) = inbound.pop() {
            setup
        } else {
            match host_proxy.receive_control(config.receive_timeout) {
                Ok(Some(setup)) => setup,
                Ok(None) => continue,
                Err(Error::ProxyDisconnect) => {
                    warn!("EP0 relay exiting: host proxy disconnected");
                    return RelayerOutcome { dead: true };
                }
                Err(err) => {
                    warn!("EP0 transport error waiting for host: {err}");
                    backoff.sleep();
                    continue;
                }
            }
        };

        backoff.reset();

        let setup = if setup.should_filter() {
            match filters.apply_setup(setup) {
                Some(setup) => setup,
                None => {
                    debug!("setup transaction dropped by filter chain");
                    continue;
                }
            }
        } else {
            setup
        };

        if let Err(err) = dispatch(&setup, &device_proxy, &host_proxy, observer.as_ref()) {
            if matches!(err, Error::ProxyDisconnect) {
                warn!("EP0 relay exiting: device proxy disconnected");
                return RelayerOutcome { dead: true };
            }
            warn!("EP0 transport error completing transaction: {err}");
            backoff.sleep();
        }
    }
}

fn dispatch(
    setup: &SetupPacket,
    device_proxy: &Arc<dyn DeviceProxy>,
    host_proxy: &Arc<dyn HostProxy>,
    observer: &dyn ConfigurationObserver,
) -> Result<(), Error> {
    let request = setup.request();

    if request.is_set_configuration() {
        let index = request.configuration_value();
        info!("observed SET_CONFIGURATION({index}) on EP0");
        observer.on_set_configuration(index);
        // The configuration change already happened synchronously above;
        // acknowledge with an empty, successful status stage.
        let ack = SetupPacket::new(request, None, false);
        return host_proxy.complete_control(ack);
    }

    let reply = device_proxy.send_setup(setup)?;

    if request.is_set_interface() {
        observer.on_set_interface(request.index as u8, request.configuration_value());
    }

    host_proxy.complete_control(reply)
}
