//! Trait abstraction for USB bulk transfers to enable testing

use tracing::{debug, error};

use crate::error::{Result, RfspyError, TransportFault};
use crate::rpc::protocol::RESPONSE_HEADER_LEN;

/// Blocking bulk-transfer primitive the RPC client is layered on
///
/// One implementation talks to real hardware through rusb; tests script one.
pub trait BulkTransport {
    /// Write one request; returns the number of bytes the endpoint accepted
    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, TransportFault>;

    /// Read one transfer of at most `max_len` bytes
    fn read(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportFault>;

    /// Max packet size of the IN endpoint
    fn read_packet_size(&self) -> usize;

    /// Max packet size of the OUT endpoint
    fn write_packet_size(&self) -> usize;

    /// Largest byte count one read can deliver
    fn max_transfer_unit(&self) -> usize {
        self.read_packet_size()
    }

    /// Largest payload that fits one transfer in either direction
    fn max_payload(&self) -> usize {
        self.read_packet_size()
            .min(self.write_packet_size())
            .saturating_sub(RESPONSE_HEADER_LEN)
    }
}

impl<T: BulkTransport + ?Sized> BulkTransport for &mut T {
    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, TransportFault> {
        (**self).write(data)
    }

    fn read(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportFault> {
        (**self).read(max_len)
    }

    fn read_packet_size(&self) -> usize {
        (**self).read_packet_size()
    }

    fn write_packet_size(&self) -> usize {
        (**self).write_packet_size()
    }
}

/// A bulk endpoint found during the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Endpoint address including the direction bit
    pub address: u8,

    /// wMaxPacketSize
    pub max_packet_size: usize,
}

/// The IN/OUT endpoint pair of interface 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    /// Interface the endpoints belong to
    pub interface: u8,

    /// Device-to-host endpoint
    pub read: Endpoint,

    /// Host-to-device endpoint
    pub write: Endpoint,
}

/// Device operations used by the initialization handshake
#[cfg_attr(test, mockall::automock)]
pub trait UsbDevice {
    /// Walk the active configuration and locate the bulk endpoints
    fn discover_endpoints(&mut self) -> std::result::Result<Endpoints, TransportFault>;

    /// Issue a USB port reset
    fn reset(&mut self) -> std::result::Result<(), TransportFault>;
}

/// Discover endpoints, resetting the device between failed attempts
///
/// At most `reset_tries` resets are issued, so the handshake runs at most
/// `reset_tries + 1` times.
///
/// # Errors
///
/// Returns `InitializationFailed` carrying the last fault once every reset
/// has been used, or as soon as a reset itself fails.
pub fn discover_with_reset<D: UsbDevice + ?Sized>(device: &mut D, reset_tries: u32) -> Result<Endpoints> {
    let mut resets = 0;

    loop {
        match device.discover_endpoints() {
            Ok(endpoints) => {
                debug!("Endpoints found after {} reset(s): {:?}", resets, endpoints);
                return Ok(endpoints);
            }
            Err(fault) if resets < reset_tries => {
                error!("USB problem ({}), attempting reset", fault);
                resets += 1;
                device.reset().map_err(|source| RfspyError::InitializationFailed {
                    attempts: resets,
                    source,
                })?;
            }
            Err(fault) => {
                return Err(RfspyError::InitializationFailed {
                    attempts: resets + 1,
                    source: fault,
                });
            }
        }
    }
}
