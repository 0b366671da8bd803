//! # Dongle Discovery
//!
//! Lists attached rfcat-compatible dongles. The list is finite, built once per
//! [`DongleList::enumerate`] call, and ordered by USB address.

use rusb::{Device, GlobalContext};
use tracing::debug;

use crate::error::{Result, RfspyError};

/// Known (vendor ID, product IDs) pairs
pub const KNOWN_DONGLES: &[(u16, &[u16])] = &[
    // TI USB classic
    (0x0451, &[0x4715]),
    // OpenMoko vendor, not in bootloader mode
    (0x1D50, &[0x6047, 0x6048, 0x605B, 0x60FF]),
];

/// Whether a VID/PID pair belongs to a supported dongle
pub fn is_rfspy_dongle(vendor_id: u16, product_id: u16) -> bool {
    KNOWN_DONGLES
        .iter()
        .any(|&(vid, pids)| vid == vendor_id && pids.contains(&product_id))
}

/// One attached dongle
#[derive(Debug, Clone)]
pub struct DongleInfo<D = Device<GlobalContext>> {
    pub device: D,
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Attached dongles, sorted by USB address
#[derive(Debug, Clone)]
pub struct DongleList<D = Device<GlobalContext>> {
    dongles: Vec<DongleInfo<D>>,
}

impl DongleList {
    /// Scan the bus for supported dongles
    pub fn enumerate() -> Result<Self> {
        let mut dongles = Vec::new();

        for device in rusb::devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!("skipping device without descriptor: {}", e);
                    continue;
                }
            };

            if is_rfspy_dongle(descriptor.vendor_id(), descriptor.product_id()) {
                dongles.push(DongleInfo {
                    bus: device.bus_number(),
                    address: device.address(),
                    vendor_id: descriptor.vendor_id(),
                    product_id: descriptor.product_id(),
                    device,
                });
            }
        }

        Ok(Self::from_dongles(dongles))
    }
}

impl<D> DongleList<D> {
    /// Build a list from already-found dongles
    pub fn from_dongles(mut dongles: Vec<DongleInfo<D>>) -> Self {
        dongles.sort_by_key(|dongle| dongle.address);
        Self { dongles }
    }

    pub fn len(&self) -> usize {
        self.dongles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dongles.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DongleInfo<D>> {
        self.dongles.iter()
    }

    /// Dongle at position `index` in address order
    pub fn get_index(&self, index: usize) -> Result<&DongleInfo<D>> {
        self.dongles
            .get(index)
            .ok_or_else(|| RfspyError::DeviceNotFound(format!("index {} unavailable", index)))
    }

    /// Dongle at a specific bus/address
    pub fn get_bus_address(&self, bus: u8, address: u8) -> Result<&DongleInfo<D>> {
        self.dongles
            .iter()
            .find(|dongle| dongle.bus == bus && dongle.address == address)
            .ok_or_else(|| {
                RfspyError::DeviceNotFound(format!("bus {} address {} unavailable", bus, address))
            })
    }
}

impl<'a, D> IntoIterator for &'a DongleList<D> {
    type Item = &'a DongleInfo<D>;
    type IntoIter = std::slice::Iter<'a, DongleInfo<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.dongles.iter()
    }
}

impl<D> IntoIterator for DongleList<D> {
    type Item = DongleInfo<D>;
    type IntoIter = std::vec::IntoIter<DongleInfo<D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.dongles.into_iter()
    }
}
