//! # USB Communication Module
//!
//! Handles bulk communication with the rfcat-compatible dongle.
//!
//! This module handles:
//! - Locating the bulk IN/OUT endpoints, resetting the device on failure
//! - Selecting the USB configuration and claiming the interface
//! - Blocking bulk reads and writes with configurable timeouts
//! - Releasing (and optionally resetting) the device on close

pub mod discovery;
pub mod transport;

use std::fmt;
use std::time::Duration;

use rusb::{Device, DeviceHandle, Direction, GlobalContext, TransferType};
use tracing::{debug, info, warn};

use crate::config::{Config, UsbConfig};
use crate::error::{Result, TransportFault};
use crate::rpc::client::{RpcClient, RpcOptions};
use discovery::{DongleInfo, DongleList};
use transport::{discover_with_reset, BulkTransport, Endpoint, Endpoints, UsbDevice};

/// Lifecycle of a device handle
///
/// A [`UsbTransport`] only exists once its endpoints are known, so it starts
/// out `Enumerated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Endpoints located
    Enumerated,
    /// Configuration set and interface claimed
    Initialized,
    Closed,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceState::Enumerated => "enumerated",
            DeviceState::Initialized => "initialized",
            DeviceState::Closed => "closed",
        })
    }
}

/// Who the device says it is, captured once at enumeration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub bus: u8,
    pub address: u8,
}

/// Steps closing a handle in `state` takes: (release interface, reset device)
fn exit_steps(state: DeviceState, reset: bool) -> (bool, bool) {
    match state {
        DeviceState::Closed => (false, false),
        DeviceState::Enumerated => (false, reset),
        DeviceState::Initialized => (true, reset),
    }
}

/// rusb device plus its open handle
pub struct RusbDevice {
    device: Device<GlobalContext>,
    handle: DeviceHandle<GlobalContext>,
}

impl UsbDevice for RusbDevice {
    fn discover_endpoints(&mut self) -> std::result::Result<Endpoints, TransportFault> {
        let config = self.device.config_descriptor(0)?;
        let interface = config
            .interfaces()
            .next()
            .ok_or(TransportFault::Usb(rusb::Error::NotFound))?;
        let setting = interface
            .descriptors()
            .next()
            .ok_or(TransportFault::Usb(rusb::Error::NotFound))?;

        let mut read = None;
        let mut write = None;
        for endpoint in setting.endpoint_descriptors() {
            if endpoint.transfer_type() != TransferType::Bulk {
                continue;
            }
            let found = Endpoint {
                address: endpoint.address(),
                max_packet_size: usize::from(endpoint.max_packet_size()),
            };
            match endpoint.direction() {
                // device-to-host
                Direction::In => read = Some(found),
                // host-to-device
                Direction::Out => write = Some(found),
            }
        }

        Ok(Endpoints {
            interface: setting.interface_number(),
            read: read.ok_or(TransportFault::EndpointNotFound("IN"))?,
            write: write.ok_or(TransportFault::EndpointNotFound("OUT"))?,
        })
    }

    fn reset(&mut self) -> std::result::Result<(), TransportFault> {
        warn!("resetting device");
        self.handle.reset()?;
        Ok(())
    }
}

/// Bulk transport to one rfcat dongle
pub struct UsbTransport {
    usb: RusbDevice,
    endpoints: Endpoints,
    identity: DeviceIdentity,
    state: DeviceState,
    rx_timeout: Duration,
    tx_timeout: Duration,
    reset_on_exit: bool,
}

impl fmt::Debug for UsbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UsbTransport")
            .field("identity", &self.identity)
            .field("endpoints", &self.endpoints)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for UsbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<RfspyUsb {} : {} @ USB {}:{} {}>",
            self.identity.manufacturer.as_deref().unwrap_or("?"),
            self.identity.product.as_deref().unwrap_or("?"),
            self.identity.bus,
            self.identity.address,
            self.state
        )
    }
}

impl UsbTransport {
    /// Enumerate a device: open it, read its identity, locate its endpoints
    ///
    /// Endpoint discovery is retried after a device reset up to
    /// `config.reset_tries` times.
    ///
    /// # Errors
    ///
    /// Returns `InitializationFailed` when every reset has been used, or a
    /// transport fault if the device cannot be opened at all
    pub fn new(device: Device<GlobalContext>, config: &UsbConfig) -> Result<Self> {
        let handle = device.open()?;

        let mut identity = DeviceIdentity {
            bus: device.bus_number(),
            address: device.address(),
            ..DeviceIdentity::default()
        };
        if let Ok(descriptor) = device.device_descriptor() {
            identity.manufacturer = handle.read_manufacturer_string_ascii(&descriptor).ok();
            identity.product = handle.read_product_string_ascii(&descriptor).ok();
        }

        let mut usb = RusbDevice { device, handle };
        let endpoints = discover_with_reset(&mut usb, config.reset_tries)?;

        let transport = Self {
            usb,
            endpoints,
            identity,
            state: DeviceState::Enumerated,
            rx_timeout: Duration::from_millis(config.rx_timeout_ms),
            tx_timeout: Duration::from_millis(config.tx_timeout_ms),
            reset_on_exit: config.reset_on_exit,
        };
        debug!("enumerated {}", transport);
        Ok(transport)
    }

    /// Enumerate a dongle found by discovery
    pub fn from_dongle(dongle: &DongleInfo, config: &UsbConfig) -> Result<Self> {
        Self::new(dongle.device.clone(), config)
    }

    /// Select the configuration if none is active and claim the interface
    pub fn open(&mut self) -> Result<()> {
        match self.usb.handle.active_configuration() {
            Ok(value) if value != 0 => debug!("configuration was already set"),
            _ => {
                // the descriptor endpoint discovery walked
                let value = self.usb.device.config_descriptor(0)?.number();
                debug!("need to set configuration {}", value);
                self.usb.handle.set_active_configuration(value)?;
            }
        }

        if let Err(e) = self.usb.handle.set_auto_detach_kernel_driver(true) {
            debug!("kernel driver auto-detach unavailable: {}", e);
        }
        self.usb.handle.claim_interface(self.endpoints.interface)?;

        self.state = DeviceState::Initialized;
        info!("opened {}", self);
        Ok(())
    }

    /// Release the device, resetting it when configured to or when forced
    ///
    /// Dropping an open transport does the same with `force_reset = false`.
    pub fn close(mut self, force_reset: bool) -> Result<()> {
        self.shutdown(force_reset)
    }

    fn shutdown(&mut self, force_reset: bool) -> Result<()> {
        if self.state == DeviceState::Closed {
            return Ok(());
        }
        let (release, reset) = exit_steps(self.state, self.reset_on_exit || force_reset);
        if release {
            if let Err(e) = self.usb.handle.release_interface(self.endpoints.interface) {
                debug!("release_interface failed: {}", e);
            }
        }
        self.state = DeviceState::Closed;

        if reset {
            self.usb.reset()?;
        }
        info!("closed {}", self);
        Ok(())
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Reset the device without closing the handle
    pub fn reset(&mut self) -> Result<()> {
        self.usb.reset()?;
        Ok(())
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(false) {
            warn!("closing {} failed: {}", self, e);
        }
    }
}

impl BulkTransport for UsbTransport {
    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, TransportFault> {
        let written = self
            .usb
            .handle
            .write_bulk(self.endpoints.write.address, data, self.tx_timeout)?;
        Ok(written)
    }

    fn read(&mut self, max_len: usize) -> std::result::Result<Vec<u8>, TransportFault> {
        let mut buf = vec![0u8; max_len];
        let read = self
            .usb
            .handle
            .read_bulk(self.endpoints.read.address, &mut buf, self.rx_timeout)?;
        buf.truncate(read);
        Ok(buf)
    }

    fn read_packet_size(&self) -> usize {
        self.endpoints.read.max_packet_size
    }

    fn write_packet_size(&self) -> usize {
        self.endpoints.write.max_packet_size
    }
}

/// Find the dongle selected by `config.device`, open it and wrap it in a client
///
/// # Examples
///
/// ```no_run
/// use rfspy::config::Config;
/// use rfspy::usb::connect;
///
/// let mut client = connect(&Config::default())?;
/// println!("{}", client.get_build_info()?);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn connect(config: &Config) -> Result<RpcClient<UsbTransport>> {
    let dongles = DongleList::enumerate()?;
    info!("found {} dongle(s)", dongles.len());

    let dongle = match (config.device.bus, config.device.address) {
        (Some(bus), Some(address)) => dongles.get_bus_address(bus, address)?,
        _ => dongles.get_index(config.device.index)?,
    };

    let mut transport = UsbTransport::from_dongle(dongle, &config.usb)?;
    transport.open()?;

    Ok(RpcClient::with_options(
        transport,
        RpcOptions {
            strict: config.rpc.strict,
        },
    ))
}
