//! The device model: the result of descriptor enumeration against the
//! physical device, consumed (but not produced) by this crate. Descriptor
//! parsing itself is the Device Model component's job and is out of scope
//! here, this module only pins the read-only interface the Manager needs
//! and the plain owned value types that interface returns.

/// A flattened USB device descriptor, enough of it for relay purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub max_packet_size_0: u8,
    pub num_configurations: u8,
}

/// One endpoint inside an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// One interface inside a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub number: u8,
    pub endpoints: Vec<EndpointDescriptor>,
}

/// One configuration of the device: a set of interfaces, each with its own
/// endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub value: u8,
    pub interfaces: Vec<Interface>,
}

impl Configuration {
    pub fn endpoints(&self) -> impl Iterator<Item = (&Interface, &EndpointDescriptor)> {
        self.interfaces
            .iter()
            .flat_map(|ifc| ifc.endpoints.iter().map(move |ep| (ifc, ep)))
    }
}

/// The device qualifier descriptor: describes how the device would behave
/// at the other USB speed (high-speed vs full/low-speed), carrying its own
/// set of configurations that mirror the primary ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Qualifier {
    configurations: Vec<Configuration>,
}

impl Qualifier {
    pub fn new(configurations: Vec<Configuration>) -> Self {
        Qualifier { configurations }
    }

    pub fn get_configuration(&self, index: u8) -> Option<&Configuration> {
        self.configurations
            .iter()
            .find(|cfg| cfg.value == index)
            .or_else(|| self.configurations.get(index as usize))
    }
}

/// Read-only view of an enumerated device, as produced by the Device Model
/// component (out of scope here) from real descriptor reads, or by a test
/// double over fixture data.
pub trait DeviceModel: Send + Sync {
    fn get_descriptor(&self) -> DeviceDescriptor;
    fn get_active_configuration(&self) -> Configuration;
    fn get_configuration(&self, index: u8) -> Option<Configuration>;
    fn get_device_qualifier(&self) -> Option<Qualifier>;
    fn is_highspeed(&self) -> bool;

    /// Switches the model's notion of the active configuration. Called by
    /// the Manager in response to an observed `SET_CONFIGURATION`, before
    /// either proxy is told about the change.
    fn set_active_configuration(&self, index: u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_endpoints_flattens_interfaces() {
        let cfg = Configuration {
            value: 1,
            interfaces: vec![
                Interface {
                    number: 0,
                    endpoints: vec![EndpointDescriptor {
                        address: 0x81,
                        max_packet_size: 64,
                        interval: 1,
                    }],
                },
                Interface {
                    number: 1,
                    endpoints: vec![EndpointDescriptor {
                        address: 0x02,
                        max_packet_size: 64,
                        interval: 0,
                    }],
                },
            ],
        };
        let addrs: Vec<u8> = cfg.endpoints().map(|(_, ep)| ep.address).collect();
        assert_eq!(addrs, vec![0x81, 0x02]);
    }

    #[test]
    fn qualifier_looks_up_by_configuration_value() {
        let qualifier = Qualifier::new(vec![Configuration {
            value: 1,
            interfaces: vec![],
        }]);
        assert!(qualifier.get_configuration(1).is_some());
    }
}
