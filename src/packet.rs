//! Value objects that cross relay queues.

use crate::request::ControlRequest;

/// Outcome of a transfer attempt, set by whichever proxy produced the
/// packet. Collapses the several libusb/UDC status codes the original
/// relay dealt with into a small enum a Rust caller can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    Ok,
    Stall,
    Timeout,
    Disconnected,
}

/// A direction-tagged byte buffer flowing through one endpoint's relay.
///
/// Mutable only by its current owner (the thread that popped it from a
/// queue); once pushed onto a queue it is handed off by move and treated
/// as read-only by everyone downstream of the push.
#[derive(Debug, Clone)]
pub struct Packet {
    endpoint_address: u8,
    payload: Vec<u8>,
    transfer_result: TransferResult,
}

impl Packet {
    pub fn new(endpoint_address: u8, payload: Vec<u8>) -> Self {
        Packet {
            endpoint_address,
            payload,
            transfer_result: TransferResult::Ok,
        }
    }

    pub fn with_result(endpoint_address: u8, payload: Vec<u8>, result: TransferResult) -> Self {
        Packet {
            endpoint_address,
            payload,
            transfer_result: result,
        }
    }

    pub fn endpoint_address(&self) -> u8 {
        self.endpoint_address
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn transfer_result(&self) -> TransferResult {
        self.transfer_result
    }

    pub fn set_transfer_result(&mut self, result: TransferResult) {
        self.transfer_result = result;
    }

    pub fn is_device_to_host(&self) -> bool {
        self.endpoint_address & 0x80 != 0
    }
}

/// A USB control transaction: the 8-byte setup stage plus an optional data
/// stage. Only flows on the EP0 queue.
#[derive(Debug, Clone)]
pub struct SetupPacket {
    request: ControlRequest,
    data: Vec<u8>,
    /// Whether the outgoing transfer must traverse the filter chain before
    /// reaching its destination.
    filter: bool,
    transfer_result: TransferResult,
}

impl SetupPacket {
    /// Builds a setup packet. Per the constructor contract: if
    /// `request.length == 0` or no data was supplied, the payload is empty.
    pub fn new(request: ControlRequest, data: Option<Vec<u8>>, filter: bool) -> Self {
        let data = if request.length == 0 {
            Vec::new()
        } else {
            data.unwrap_or_default()
        };
        SetupPacket {
            request,
            data,
            filter,
            transfer_result: TransferResult::Ok,
        }
    }

    pub fn request(&self) -> ControlRequest {
        self.request
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn should_filter(&self) -> bool {
        self.filter
    }

    pub fn transfer_result(&self) -> TransferResult {
        self.transfer_result
    }

    pub fn set_transfer_result(&mut self, result: TransferResult) {
        self.transfer_result = result;
    }
}
