//! The data-endpoint relay loop (one worker per active endpoint-direction).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use super::backoff::Backoff;
use super::RelayerOutcome;
use crate::config::ManagerConfig;
use crate::endpoint::{Direction, EndpointRef};
use crate::error::Error;
use crate::filter::FilterChain;
use crate::packet::Packet;
use crate::proxy::{DeviceProxy, HostProxy};
use crate::queue::RelayQueue;

/// Runs the relay loop for one endpoint-direction until `halt` is observed
/// or the proxy reports a terminal disconnect.
///
/// For an IN endpoint (device -> host) reads come from the device proxy
/// and writes go to the host proxy; for an OUT endpoint the roles are
/// reversed. Injected packets sitting in `inbound` are drained ahead of a
/// fresh proxy read, letting callers short-circuit the normal flow with
/// synthetic traffic.
pub fn run(
    endpoint: EndpointRef,
    device_proxy: Arc<dyn DeviceProxy>,
    host_proxy: Arc<dyn HostProxy>,
    inbound: Arc<RelayQueue<Packet>>,
    filters: FilterChain,
    halt: Arc<AtomicBool>,
    config: ManagerConfig,
) -> RelayerOutcome {
    let direction = endpoint.direction();
    let mut backoff = Backoff::new(config.backoff_floor, config.backoff_cap);

    loop {
        if halt.load(Ordering::Relaxed) {
            return RelayerOutcome { dead: false };
        }

        let packet = if let Some(packet) = inbound.pop() {
            packet
        } else {
            let read = match direction {
                Direction::In => device_proxy.receive(&endpoint, config.receive_timeout),
                Direction::Out => host_proxy.receive(&endpoint, config.receive_timeout),
            };
            match read {
                Ok(Some(packet)) => packet,
                Ok(None) => continue,
                Err(Error::ProxyDisconnect) => {
                    warn!(
                        "endpoint {:#04x} relay exiting: proxy disconnected",
                        endpoint.address()
                    );
                    return RelayerOutcome { dead: true };
                }
                Err(err) => {
                    warn!(
                        "endpoint {:#04x} transport error on receive: {err}",
                        endpoint.address()
                    );
                    backoff.sleep();
                    continue;
                }
            }
        };

        backoff.reset();

        let Some(packet) = filters.apply_packet(packet) else {
            debug!(
                "packet on endpoint {:#04x} dropped by filter chain",
                endpoint.address()
            );
            continue;
        };

        let sent = match direction {
            Direction::In => host_proxy.send(&endpoint, packet),
            Direction::Out => device_proxy.send(&endpoint, packet),
        };

        if let Err(err) = sent {
            if matches!(err, Error::ProxyDisconnect) {
                warn!(
                    "endpoint {:#04x} relay exiting: proxy disconnected",
                    endpoint.address()
                );
                return RelayerOutcome { dead: true };
            }
            warn!(
                "endpoint {:#04x} transport error on send: {err}",
                endpoint.address()
            );
            backoff.sleep();
        }
    }
}
