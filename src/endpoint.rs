//! Immutable endpoint handles.

/// Direction of an endpoint, derived from bit 7 of its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Out,
    In,
}

impl Direction {
    pub fn from_address(address: u8) -> Direction {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// A read-only handle to one endpoint of the active configuration.
///
/// Valid for the life of a configuration: when the Manager rebuilds the
/// device model (a new `SET_CONFIGURATION`), every outstanding `EndpointRef`
/// borrowed from that model is invalidated along with it. The EP0 endpoint
/// is the one exception (it is synthesized by the Manager itself rather
/// than borrowed from the device model, see [`crate::manager`]).
#[derive(Debug, Clone, Copy)]
pub struct EndpointRef {
    address: u8,
    max_packet_size: u16,
    interval: u8,
    interface_number: u8,
}

impl EndpointRef {
    pub fn new(address: u8, max_packet_size: u16, interval: u8, interface_number: u8) -> Self {
        EndpointRef {
            address,
            max_packet_size,
            interval,
            interface_number,
        }
    }

    /// Synthesizes the control endpoint, address 0, not tied to any interface.
    pub fn control(max_packet_size: u16) -> Self {
        EndpointRef {
            address: 0,
            max_packet_size,
            interval: 0,
            interface_number: 0,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn direction(&self) -> Direction {
        Direction::from_address(self.address)
    }

    /// The 4-bit endpoint number, irrespective of direction.
    pub fn endpoint_number(&self) -> u8 {
        self.address & 0x0f
    }

    pub fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    pub fn interval(&self) -> u8 {
        self.interval
    }

    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    pub fn is_control(&self) -> bool {
        self.endpoint_number() == 0
    }
}

impl PartialEq for EndpointRef {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}
impl Eq for EndpointRef {}
