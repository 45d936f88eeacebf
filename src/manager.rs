//! The Manager: enumerates the proxied device, builds the per-endpoint
//! relay topology, owns the worker fleet, applies the filter chain, and
//! admits injectors.
//!
//! State transitions: `Idle -> Setup -> Relaying -> Stopping -> Idle`.
//! The Manager is single-writer on control operations by caller
//! discipline (§5), its own mutex exists to make that discipline memory
//! safe, not to serialize operations that are already supposed to be
//! sequential.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::endpoint::{Direction, EndpointRef};
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterChain};
use crate::injector::{Injector, PacketSink};
use crate::model::DeviceModel;
use crate::packet::{Packet, SetupPacket};
use crate::proxy::{DeviceProxy, HostProxy};
use crate::queue::RelayQueue;
use crate::relayer::{ConfigurationObserver, Relayer};
use crate::request::ControlRequest;

/// Where the Manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    Idle,
    Setup,
    Relaying,
    Stopping,
}

struct EndpointSlot<T> {
    relayer: Relayer,
    queue: Arc<RelayQueue<T>>,
}

struct InjectorWorker {
    halt: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl InjectorWorker {
    fn join(mut self) {
        if let Some(handle) = self.join.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InjectorWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.join.take() {
            self.halt.store(true, Ordering::SeqCst);
            let _ = handle.join();
        }
    }
}

struct ManagerState {
    status: ManagerStatus,
    device_model: Option<Arc<dyn DeviceModel>>,
    /// The control relay and its queue. Logically this is `out_relays[0]`
    /// in spec.md's state table, which reserves index 0 for EP0, kept as
    /// a dedicated field here because its queue carries `SetupPacket`, a
    /// different element type than the `Packet` queues of every other
    /// relay, and Rust's arrays are homogeneous.
    ep0: Option<EndpointSlot<SetupPacket>>,
    in_relays: [Option<EndpointSlot<Packet>>; 16],
    out_relays: [Option<EndpointSlot<Packet>>; 16],
    claimed_interfaces: Vec<u8>,
    filters: Vec<Arc<dyn Filter>>,
    injectors: Vec<Arc<dyn Injector>>,
    injector_workers: Vec<InjectorWorker>,
}

impl Default for ManagerState {
    fn default() -> Self {
        ManagerState {
            status: ManagerStatus::Idle,
            device_model: None,
            ep0: None,
            in_relays: std::array::from_fn(|_| None),
            out_relays: std::array::from_fn(|_| None),
            claimed_interfaces: Vec::new(),
            filters: Vec::new(),
            injectors: Vec::new(),
            injector_workers: Vec::new(),
        }
    }
}

/// The orchestrator described in full by `SPEC_FULL.md` §4.7.
pub struct Manager {
    device_proxy: Arc<dyn DeviceProxy>,
    host_proxy: Arc<dyn HostProxy>,
    config: ManagerConfig,
    state: Mutex<ManagerState>,
    /// A handle back to the enclosing `Arc`, populated at construction via
    /// `Arc::new_cyclic`. Needed so that injector workers and the EP0
    /// relay can be handed `Arc<dyn PacketSink>` / `Arc<dyn
    /// ConfigurationObserver>` views of the same Manager from inside a
    /// `&self` method, the same way the teacher's `SystemdDaemon` keeps an
    /// `Arc<Self>` around to spawn workers that call back into it
    /// (see DESIGN.md).
    self_ref: Weak<Manager>,
}

impl Manager {
    pub fn new(
        device_proxy: Arc<dyn DeviceProxy>,
        host_proxy: Arc<dyn HostProxy>,
        config: ManagerConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Manager {
            device_proxy,
            host_proxy,
            config,
            state: Mutex::new(ManagerState::default()),
            self_ref: weak.clone(),
        })
    }

    /// Upgrades the Manager's own self-reference. Always succeeds: the
    /// `Weak` is only ever read while at least one `Arc<Manager>` (the
    /// caller's own handle) is alive.
    fn arc_self(&self) -> Arc<Manager> {
        self.self_ref
            .upgrade()
            .expect("Manager dropped while one of its own methods was running")
    }

    pub fn status(&self) -> ManagerStatus {
        self.state.lock().unwrap().status
    }

    pub fn filter_count(&self) -> usize {
        self.state.lock().unwrap().filters.len()
    }

    pub fn injector_count(&self) -> usize {
        self.state.lock().unwrap().injectors.len()
    }

    pub fn in_relay_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .in_relays
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    pub fn out_relay_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .out_relays
            .iter()
            .filter(|slot| slot.is_some())
            .count()
    }

    // -- registration, legal only while Idle ---------------------------

    pub fn add_filter(&self, filter: Arc<dyn Filter>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::require_idle(state.status)?;
        state.filters.push(filter);
        Ok(())
    }

    pub fn remove_filter(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::require_idle(state.status)?;
        if index >= state.filters.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: state.filters.len(),
            });
        }
        state.filters.remove(index);
        Ok(())
    }

    pub fn add_injector(&self, injector: Arc<dyn Injector>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::require_idle(state.status)?;
        state.injectors.push(injector);
        Ok(())
    }

    pub fn remove_injector(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::require_idle(state.status)?;
        if index >= state.injectors.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: state.injectors.len(),
            });
        }
        state.injectors.remove(index);
        Ok(())
    }

    fn require_idle(status: ManagerStatus) -> Result<()> {
        if status != ManagerStatus::Idle {
            return Err(Error::InvalidState {
                expected: "Idle",
                actual: status,
            });
        }
        Ok(())
    }

    // -- injection, legal only while Relaying --------------------------

    pub fn inject_packet(&self, packet: Packet) -> Result<bool> {
        self.try_inject_packet(packet)
    }

    pub fn inject_setup_in(&self, request: ControlRequest, filter: bool) -> Result<bool> {
        self.try_inject_setup(SetupPacket::new(request, None, filter))
    }

    pub fn inject_setup_out(
        &self,
        request: ControlRequest,
        data: Vec<u8>,
        filter: bool,
    ) -> Result<bool> {
        self.try_inject_setup(SetupPacket::new(request, Some(data), filter))
    }

    fn try_inject_packet(&self, packet: Packet) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.status != ManagerStatus::Relaying {
            return Err(Error::InvalidState {
                expected: "Relaying",
                actual: state.status,
            });
        }
        let ep_num = (packet.endpoint_address() & 0x0f) as usize;
        let slot = if packet.is_device_to_host() {
            &state.in_relays[ep_num]
        } else {
            &state.out_relays[ep_num]
        };
        Ok(match slot {
            Some(slot) => slot.queue.push(packet),
            None => false,
        })
    }

    fn try_inject_setup(&self, setup: SetupPacket) -> Result<bool> {
        let state = self.state.lock().unwrap();
        if state.status != ManagerStatus::Relaying {
            return Err(Error::InvalidState {
                expected: "Relaying",
                actual: state.status,
            });
        }
        Ok(match &state.ep0 {
            Some(slot) => slot.queue.push(setup),
            None => false,
        })
    }

    // -- lifecycle ------------------------------------------------------

    /// §4.7 `start_control_relaying`. Connects both proxies, enumerates
    /// the device, builds the EP0 relay and starts it plus every
    /// registered injector.
    pub fn start_control_relaying(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::require_idle(state.status)?;
        state.status = ManagerStatus::Setup;
        info!("start_control_relaying: connecting proxies");

        if let Err(err) = self.device_proxy.connect() {
            warn!("device proxy connect failed: {err}");
            state.status = ManagerStatus::Idle;
            return Err(Error::ProxyConnect(err.to_string()));
        }

        let device_model = match self.device_proxy.build_device_model() {
            Ok(model) => model,
            Err(err) => {
                warn!("device model enumeration failed: {err}");
                self.device_proxy.disconnect();
                state.status = ManagerStatus::Idle;
                return Err(err);
            }
        };

        let descriptor = device_model.get_descriptor();
        let ep0_endpoint = EndpointRef::control(descriptor.max_packet_size_0 as u16);

        let mut ep0_filters = FilterChain::new();
        for filter in &state.filters {
            if filter.test_device(device_model.as_ref()) && filter.test_endpoint(&ep0_endpoint) {
                ep0_filters.push(Arc::clone(filter));
            }
        }

        if let Err(err) = self.host_proxy.connect(device_model.as_ref()) {
            warn!("host proxy connect failed: {err}");
            state.device_model = Some(device_model);
            drop(state);
            let _ = self.stop_relaying();
            return Err(Error::ProxyConnect(err.to_string()));
        }

        state.device_model = Some(device_model);

        let injectors = state.injectors.clone();
        let mut injector_workers = Vec::with_capacity(injectors.len());
        for injector in injectors {
            let sink: Arc<dyn PacketSink> = self.arc_self() as Arc<dyn PacketSink>;
            let halt = Arc::new(AtomicBool::new(false));
            let worker_halt = Arc::clone(&halt);
            let join = thread::Builder::new()
                .name("usbrelay-injector".to_string())
                .spawn(move || injector.run(sink.as_ref(), &worker_halt))
                .expect("failed to spawn injector worker thread");
            injector_workers.push(InjectorWorker {
                halt,
                join: Some(join),
            });
        }
        state.injector_workers = injector_workers;

        let ep0_queue = Arc::new(RelayQueue::new());
        let observer: Arc<dyn ConfigurationObserver> = self.arc_self() as Arc<dyn ConfigurationObserver>;
        let relayer = Relayer::spawn_control(
            ep0_endpoint,
            Arc::clone(&self.device_proxy),
            Arc::clone(&self.host_proxy),
            Arc::clone(&ep0_queue),
            ep0_filters,
            observer,
            self.config,
        );
        state.ep0 = Some(EndpointSlot {
            relayer,
            queue: ep0_queue,
        });

        state.status = ManagerStatus::Relaying;
        info!("control relaying active");
        Ok(())
    }

    /// §4.7 `start_data_relaying`, reachable only through
    /// `on_set_configuration` (this is the `set_config` operation of
    /// spec.md, whose precondition ties it to that callback context).
    fn start_data_relaying_locked(&self, state: &mut ManagerState, config_index: u8) -> Result<()> {
        let device_model = state
            .device_model
            .as_ref()
            .ok_or(Error::InvalidState {
                expected: "device model present",
                actual: state.status,
            })?
            .clone();

        let configuration = device_model.get_configuration(config_index).ok_or(
            Error::IndexOutOfRange {
                index: config_index as usize,
                len: device_model.get_descriptor().num_configurations as usize,
            },
        )?;

        for (interface, ep_desc) in configuration.endpoints() {
            let endpoint = EndpointRef::new(
                ep_desc.address,
                ep_desc.max_packet_size,
                ep_desc.interval,
                interface.number,
            );
            let ep_num = endpoint.endpoint_number() as usize;

            let mut chain = FilterChain::new();
            for filter in &state.filters {
                if filter.test_device(device_model.as_ref())
                    && filter.test_configuration(&configuration)
                    && filter.test_endpoint(&endpoint)
                    && filter.test_interface(interface)
                {
                    chain.push(Arc::clone(filter));
                }
            }

            let queue = Arc::new(RelayQueue::new());
            let relayer = Relayer::spawn_data(
                endpoint,
                Arc::clone(&self.device_proxy),
                Arc::clone(&self.host_proxy),
                Arc::clone(&queue),
                chain,
                self.config,
            );
            let slot = EndpointSlot { relayer, queue };

            match endpoint.direction() {
                Direction::In => state.in_relays[ep_num] = Some(slot),
                Direction::Out if ep_num == 0 => {
                    warn!("configuration descriptor names OUT endpoint 0; ignoring, reserved for EP0");
                }
                Direction::Out => state.out_relays[ep_num] = Some(slot),
            }
        }

        for interface in &configuration.interfaces {
            self.device_proxy.claim_interface(interface.number)?;
            state.claimed_interfaces.push(interface.number);
        }

        info!(
            "data relaying started for configuration {config_index} ({} interfaces)",
            configuration.interfaces.len()
        );
        Ok(())
    }

    /// Tears down data relays (endpoints 1-15, both directions) and
    /// releases claimed interfaces. The EP0 relay and injectors are left
    /// running, this is the split the original conflated into a single
    /// full stop (§9 "Mid-session data-relay restart").
    fn stop_data_relaying_locked(&self, state: &mut ManagerState) {
        for i in 0..16 {
            if let Some(slot) = &state.in_relays[i] {
                slot.relayer.signal_halt();
            }
            if let Some(slot) = &state.out_relays[i] {
                slot.relayer.signal_halt();
            }
        }
        for i in 0..16 {
            if let Some(slot) = state.in_relays[i].take() {
                let outcome = slot.relayer.join();
                let drained = slot.queue.drain();
                if drained > 0 {
                    debug!("drained {drained} packets from in-endpoint {i:#04x} on stop");
                }
                if outcome.dead {
                    warn!("in-relay for endpoint {i:#04x} exited due to disconnect");
                }
            }
            if let Some(slot) = state.out_relays[i].take() {
                let outcome = slot.relayer.join();
                let drained = slot.queue.drain();
                if drained > 0 {
                    debug!("drained {drained} packets from out-endpoint {i:#04x} on stop");
                }
                if outcome.dead {
                    warn!("out-relay for endpoint {i:#04x} exited due to disconnect");
                }
            }
        }
        for interface in state.claimed_interfaces.drain(..) {
            if let Err(err) = self.device_proxy.release_interface(interface) {
                warn!("failed to release interface {interface}: {err}");
            }
        }
    }

    fn apply_configuration_to_proxies(
        &self,
        device_model: &dyn DeviceModel,
        index: u8,
    ) -> Result<()> {
        let native = device_model.get_configuration(index).ok_or(
            Error::IndexOutOfRange {
                index: index as usize,
                len: device_model.get_descriptor().num_configurations as usize,
            },
        )?;
        let highspeed = device_model.is_highspeed();
        let qualifier_config = device_model
            .get_device_qualifier()
            .and_then(|qualifier| qualifier.get_configuration(index).cloned());

        // Argument order mirrors the original `Manager::setConfig` exactly
        // (see DESIGN.md): when highspeed, the qualifier's configuration is
        // passed first; otherwise the native one is. A missing qualifier
        // entry falls back to the no-qualifier branch rather than the
        // original's unchecked null dereference.
        match &qualifier_config {
            Some(alt) if highspeed => {
                self.device_proxy.set_config(alt, Some(&native), true)?;
                self.host_proxy.set_config(alt, Some(&native), true)?;
            }
            Some(alt) => {
                self.device_proxy.set_config(&native, Some(alt), false)?;
                self.host_proxy.set_config(&native, Some(alt), false)?;
            }
            None => {
                self.device_proxy.set_config(&native, None, highspeed)?;
                self.host_proxy.set_config(&native, None, highspeed)?;
            }
        }
        Ok(())
    }

    /// §4.7 `stop_relaying`: the full teardown, idempotent and callable
    /// from any thread other than one of the Manager's own relay workers.
    pub fn stop_relaying(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.status != ManagerStatus::Relaying && state.status != ManagerStatus::Setup {
            return Ok(());
        }
        state.status = ManagerStatus::Stopping;
        info!("stop_relaying: tearing down");

        for worker in &state.injector_workers {
            worker.halt.store(true, Ordering::SeqCst);
        }
        if let Some(slot) = &state.ep0 {
            slot.relayer.signal_halt();
        }
        for i in 0..16 {
            if let Some(slot) = &state.in_relays[i] {
                slot.relayer.signal_halt();
            }
            if let Some(slot) = &state.out_relays[i] {
                slot.relayer.signal_halt();
            }
        }

        // Data relays never call back into `Manager`, so joining them
        // while `state` stays locked is safe. Injectors and the EP0
        // relay are different: an injector's `run()` calls back through
        // `PacketSink::inject*`, and the EP0 relay's dispatch calls
        // `on_set_configuration`, both of which lock `state` themselves.
        // Take their handles out of `state` here, drop the guard, and
        // join them unlocked below — otherwise a worker blocked on this
        // very lock, mid-callback, would deadlock against the join.
        let injector_workers = std::mem::take(&mut state.injector_workers);
        self.stop_data_relaying_locked(&mut state);
        let ep0_slot = state.ep0.take();
        drop(state);

        for worker in injector_workers {
            worker.join();
        }

        if let Some(slot) = ep0_slot {
            let outcome = slot.relayer.join();
            let drained = slot.queue.drain();
            if drained > 0 {
                debug!("drained {drained} setup packets from EP0 on stop");
            }
            if outcome.dead {
                warn!("EP0 relay exited due to disconnect");
            }
        }

        self.host_proxy.disconnect();
        self.device_proxy.disconnect();

        let mut state = self.state.lock().unwrap();
        state.device_model = None;
        state.status = ManagerStatus::Idle;
        info!("relaying stopped");
        Ok(())
    }
}

impl ConfigurationObserver for Manager {
    fn on_set_configuration(&self, index: u8) {
        let mut state = self.state.lock().unwrap();
        if state.status != ManagerStatus::Relaying {
            warn!("SET_CONFIGURATION observed while not relaying; ignoring");
            return;
        }
        let device_model = match &state.device_model {
            Some(model) => Arc::clone(model),
            None => {
                warn!("SET_CONFIGURATION observed with no device model; ignoring");
                return;
            }
        };

        device_model.set_active_configuration(index);

        if let Err(err) = self.apply_configuration_to_proxies(device_model.as_ref(), index) {
            warn!("failed to apply configuration {index} to proxies: {err}");
            return;
        }

        self.stop_data_relaying_locked(&mut state);
        if let Err(err) = self.start_data_relaying_locked(&mut state, index) {
            warn!("failed to start data relaying for configuration {index}: {err}");
        }
    }

    fn on_set_interface(&self, interface_number: u8, alternate_setting: u8) {
        debug!("SET_INTERFACE({interface_number}, alt={alternate_setting}) forwarded to device");
    }
}

impl PacketSink for Manager {
    fn inject(&self, packet: Packet) -> bool {
        self.try_inject_packet(packet).unwrap_or(false)
    }

    fn inject_setup_in(&self, request: ControlRequest, filter: bool) -> bool {
        self.try_inject_setup(SetupPacket::new(request, None, filter))
            .unwrap_or(false)
    }

    fn inject_setup_out(&self, request: ControlRequest, data: Vec<u8>, filter: bool) -> bool {
        self.try_inject_setup(SetupPacket::new(request, Some(data), filter))
            .unwrap_or(false)
    }
}
