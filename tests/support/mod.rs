//! In-memory fakes standing in for the Device Proxy, Host Proxy, and
//! Device Model (external collaborators this crate does not implement,
//! per `SPEC_FULL.md` §1). Used only by the integration tests in
//! `scenarios.rs` to exercise the Manager without real USB hardware.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use eclipse_usbproxy::endpoint::EndpointRef;
use eclipse_usbproxy::error::Result;
use eclipse_usbproxy::manager::Manager;
use eclipse_usbproxy::model::{
    Configuration, DeviceDescriptor, DeviceModel, EndpointDescriptor, Interface, Qualifier,
};
use eclipse_usbproxy::packet::{Packet, SetupPacket, TransferResult};
use eclipse_usbproxy::proxy::{DeviceProxy, HostProxy};
use eclipse_usbproxy::request::ControlRequest;
use eclipse_usbproxy::ManagerConfig;

/// A single bulk IN endpoint (0x81) and bulk OUT endpoint (0x02) on
/// interface 0, configuration 1. Enough shape to exercise the scenarios
/// in spec §8 without a real descriptor tree.
pub struct FakeDeviceModel {
    descriptor: DeviceDescriptor,
    configurations: Vec<Configuration>,
    qualifier: Option<Qualifier>,
    highspeed: bool,
    active: AtomicU8,
}

impl FakeDeviceModel {
    pub fn single_configuration() -> Arc<Self> {
        let configuration = Configuration {
            value: 1,
            interfaces: vec![Interface {
                number: 0,
                endpoints: vec![
                    EndpointDescriptor {
                        address: 0x81,
                        max_packet_size: 64,
                        interval: 1,
                    },
                    EndpointDescriptor {
                        address: 0x02,
                        max_packet_size: 64,
                        interval: 0,
                    },
                ],
            }],
        };
        Arc::new(FakeDeviceModel {
            descriptor: DeviceDescriptor {
                vendor_id: 0x1234,
                product_id: 0x5678,
                max_packet_size_0: 64,
                num_configurations: 1,
            },
            configurations: vec![configuration],
            qualifier: None,
            highspeed: false,
            active: AtomicU8::new(0),
        })
    }
}

impl DeviceModel for FakeDeviceModel {
    fn get_descriptor(&self) -> DeviceDescriptor {
        self.descriptor
    }

    fn get_active_configuration(&self) -> Configuration {
        self.get_configuration(self.active.load(Ordering::SeqCst))
            .expect("active configuration index always valid in fixtures")
    }

    fn get_configuration(&self, index: u8) -> Option<Configuration> {
        self.configurations.iter().find(|c| c.value == index).cloned()
    }

    fn get_device_qualifier(&self) -> Option<Qualifier> {
        self.qualifier.clone()
    }

    fn is_highspeed(&self) -> bool {
        self.highspeed
    }

    fn set_active_configuration(&self, index: u8) {
        self.active.store(index, Ordering::SeqCst);
    }
}

/// Stands in for the physical device. `receive`/`send_setup` answer
/// immediately; there is no spontaneous device-side traffic in these
/// fixtures, so data IN reads always time out empty unless a test injects
/// directly onto the relay's queue.
pub struct FakeDeviceProxy {
    model: Arc<FakeDeviceModel>,
    pub claimed: Mutex<Vec<u8>>,
    pub released: Mutex<Vec<u8>>,
    pub sent_to_device: Mutex<Vec<Packet>>,
    pub set_configs: Mutex<Vec<(u8, bool)>>,
}

impl FakeDeviceProxy {
    pub fn new(model: Arc<FakeDeviceModel>) -> Arc<Self> {
        Arc::new(FakeDeviceProxy {
            model,
            claimed: Mutex::new(Vec::new()),
            released: Mutex::new(Vec::new()),
            sent_to_device: Mutex::new(Vec::new()),
            set_configs: Mutex::new(Vec::new()),
        })
    }
}

impl DeviceProxy for FakeDeviceProxy {
    fn connect(&self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) {}

    fn build_device_model(&self) -> Result<Arc<dyn DeviceModel>> {
        Ok(self.model.clone() as Arc<dyn DeviceModel>)
    }

    fn send(&self, _endpoint: &EndpointRef, packet: Packet) -> Result<()> {
        self.sent_to_device.lock().unwrap().push(packet);
        Ok(())
    }

    fn receive(&self, _endpoint: &EndpointRef, timeout: Duration) -> Result<Option<Packet>> {
        thread::sleep(timeout);
        Ok(None)
    }

    fn send_setup(&self, setup: &SetupPacket) -> Result<SetupPacket> {
        let request = setup.request();
        // GET_DESCRIPTOR(DEVICE): answer with a fixed 18-byte descriptor,
        // matching spec §8 scenario 1's `(0x80,0x06,0x0100,0,18)`.
        if request.is_device_to_host() && request.request == 0x06 {
            let mut data = vec![0u8; request.length as usize];
            data[0] = 18; // bLength
            data[1] = 0x01; // bDescriptorType = DEVICE
            let mut reply = SetupPacket::new(request, Some(data), setup.should_filter());
            reply.set_transfer_result(TransferResult::Ok);
            return Ok(reply);
        }
        let mut reply = SetupPacket::new(request, None, setup.should_filter());
        reply.set_transfer_result(TransferResult::Ok);
        Ok(reply)
    }

    fn claim_interface(&self, interface_number: u8) -> Result<()> {
        self.claimed.lock().unwrap().push(interface_number);
        Ok(())
    }

    fn release_interface(&self, interface_number: u8) -> Result<()> {
        self.released.lock().unwrap().push(interface_number);
        Ok(())
    }

    fn set_config(
        &self,
        primary: &Configuration,
        _qualifier_alt: Option<&Configuration>,
        highspeed: bool,
    ) -> Result<()> {
        self.set_configs.lock().unwrap().push((primary.value, highspeed));
        Ok(())
    }
}

/// Stands in for the upstream host. Nothing arrives spontaneously on
/// `receive`/`receive_control`; tests drive traffic exclusively through
/// the Manager's `inject_*` surface and observe what lands here.
pub struct FakeHostProxy {
    pub delivered_in: Mutex<Vec<Packet>>,
    pub completed_control: Mutex<Vec<SetupPacket>>,
    pub set_configs: Mutex<Vec<(u8, bool)>>,
}

impl FakeHostProxy {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeHostProxy {
            delivered_in: Mutex::new(Vec::new()),
            completed_control: Mutex::new(Vec::new()),
            set_configs: Mutex::new(Vec::new()),
        })
    }
}

impl HostProxy for FakeHostProxy {
    fn connect(&self, _device: &dyn DeviceModel) -> Result<()> {
        Ok(())
    }

    fn disconnect(&self) {}

    fn send(&self, _endpoint: &EndpointRef, packet: Packet) -> Result<()> {
        self.delivered_in.lock().unwrap().push(packet);
        Ok(())
    }

    fn receive(&self, _endpoint: &EndpointRef, timeout: Duration) -> Result<Option<Packet>> {
        thread::sleep(timeout);
        Ok(None)
    }

    fn receive_control(&self, timeout: Duration) -> Result<Option<SetupPacket>> {
        thread::sleep(timeout);
        Ok(None)
    }

    fn complete_control(&self, response: SetupPacket) -> Result<()> {
        self.completed_control.lock().unwrap().push(response);
        Ok(())
    }

    fn set_config(
        &self,
        primary: &Configuration,
        _qualifier_alt: Option<&Configuration>,
        highspeed: bool,
    ) -> Result<()> {
        self.set_configs.lock().unwrap().push((primary.value, highspeed));
        Ok(())
    }
}

/// Short timeouts so the test suite doesn't spend real wall-clock time on
/// halt-latency or backoff sleeps.
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        receive_timeout: Duration::from_millis(2),
        backoff_floor: Duration::from_millis(1),
        backoff_cap: Duration::from_millis(10),
    }
}

pub fn build_manager() -> (Arc<Manager>, Arc<FakeDeviceProxy>, Arc<FakeHostProxy>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let model = FakeDeviceModel::single_configuration();
    let device_proxy = FakeDeviceProxy::new(model);
    let host_proxy = FakeHostProxy::new();
    let manager = Manager::new(
        device_proxy.clone() as Arc<dyn DeviceProxy>,
        host_proxy.clone() as Arc<dyn HostProxy>,
        test_config(),
    );
    (manager, device_proxy, host_proxy)
}

/// Injects the standard `SET_CONFIGURATION(index)` request used by every
/// scenario that needs data relays up, the same way a real host driver
/// would kick off enumeration.
pub fn set_configuration(manager: &Manager, index: u16) {
    let request = ControlRequest::new(0x00, 0x09, index, 0, 0);
    manager
        .inject_setup_in(request, false)
        .expect("manager must be relaying to accept SET_CONFIGURATION");
}

/// Polls `predicate` until it's true or `timeout` elapses. Standing in for
/// a condvar here would require threading more state through the fakes
/// than the scenarios need; every wait in this suite resolves in single-
/// digit milliseconds in practice.
pub fn wait_for<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if predicate() {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

pub fn halted(flag: &AtomicBool) -> bool {
    flag.load(Ordering::Relaxed)
}
