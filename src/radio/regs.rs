//! # Radio Register Map
//!
//! Named offsets and widths of the radio configuration registers, relative to
//! the register page at [`BASE`] in the dongle's XDATA address space.

use std::ops::Range;

/// Address of the first configuration register
pub const BASE: u16 = 0xDF00;

/// One named register range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Register name as used in the radio datasheet
    pub name: &'static str,

    /// Byte offset from [`BASE`]
    pub offset: u16,

    /// Width in bytes
    pub width: u8,

    /// Unknown span that is carried through untouched
    pub reserved: bool,
}

impl Register {
    const fn new(name: &'static str, offset: u16, width: u8) -> Self {
        Self { name, offset, width, reserved: false }
    }

    const fn reserved(name: &'static str, offset: u16, width: u8) -> Self {
        Self { name, offset, width, reserved: true }
    }

    /// Absolute device address of the first byte
    pub const fn address(&self) -> u16 {
        BASE + self.offset
    }

    /// Byte range within the configuration page
    pub fn span(&self) -> Range<usize> {
        let start = self.offset as usize;
        start..start + self.width as usize
    }

    /// Whether the wire value is stored most-significant-byte first
    ///
    /// Multi-byte registers are; single bytes and reserved spans are copied
    /// as-is.
    pub const fn is_reversed(&self) -> bool {
        self.width > 1 && !self.reserved
    }
}

/// Sync word
pub const SYNC: Register = Register::new("SYNC", 0x00, 2);
/// Packet length
pub const PKTLEN: Register = Register::new("PKTLEN", 0x02, 1);
/// Packet automation control
pub const PKTCTRL: Register = Register::new("PKTCTRL", 0x03, 2);
/// Device address
pub const ADDR: Register = Register::new("ADDR", 0x05, 1);
/// Channel number
pub const CHANNR: Register = Register::new("CHANNR", 0x06, 1);
/// Frequency synthesizer control
pub const FSCTRL: Register = Register::new("FSCTRL", 0x07, 2);
/// Frequency control word
pub const FREQ: Register = Register::new("FREQ", 0x09, 3);
/// Modem configuration
pub const MDMCFG: Register = Register::new("MDMCFG", 0x0C, 5);
/// Modem deviation
pub const DEVIATN: Register = Register::new("DEVIATN", 0x11, 1);
/// Main radio control state machine configuration
pub const MCSM: Register = Register::new("MCSM", 0x12, 3);
/// Frequency offset compensation
pub const FOCCFG: Register = Register::new("FOCCFG", 0x15, 1);
/// Bit synchronization
pub const BSCFG: Register = Register::new("BSCFG", 0x16, 1);
/// AGC control
pub const AGCCTRL: Register = Register::new("AGCCTRL", 0x17, 3);
/// Front end RX/TX
pub const FREND: Register = Register::new("FREND", 0x1A, 2);
/// Frequency synthesizer calibration
pub const FSCAL: Register = Register::new("FSCAL", 0x1C, 4);
pub const Z: Register = Register::reserved("Z", 0x20, 3);
/// Test settings
pub const TEST: Register = Register::new("TEST", 0x23, 3);
pub const Z_3: Register = Register::reserved("Z_3", 0x26, 1);
/// Power amplifier output settings
pub const PA_TABLE: Register = Register::new("PA_TABLE", 0x27, 8);
/// I/O configuration
pub const IOCFG: Register = Register::new("IOCFG", 0x2F, 3);
pub const Z_4: Register = Register::reserved("Z_4", 0x32, 4);
pub const PARTNUM: Register = Register::new("PARTNUM", 0x36, 1);
pub const CHIPID: Register = Register::new("CHIPID", 0x37, 1);
/// Frequency offset estimate
pub const FREQEST: Register = Register::new("FREQEST", 0x38, 1);
/// Link quality indicator
pub const LQI: Register = Register::new("LQI", 0x39, 1);
pub const RSSI: Register = Register::new("RSSI", 0x3A, 1);
/// Main radio state machine state
pub const MARCSTATE: Register = Register::new("MARCSTATE", 0x3B, 1);
/// Packet status
pub const PKSTATUS: Register = Register::new("PKSTATUS", 0x3C, 1);
/// VCO calibration DAC
pub const VCO_VC_DAC: Register = Register::new("VCO_VC_DAC", 0x3D, 1);

/// Every register of the configuration page, in offset order
pub static CONFIG_PAGE: [Register; 29] = [
    SYNC, PKTLEN, PKTCTRL, ADDR, CHANNR, FSCTRL, FREQ, MDMCFG, DEVIATN, MCSM, FOCCFG, BSCFG,
    AGCCTRL, FREND, FSCAL, Z, TEST, Z_3, PA_TABLE, IOCFG, Z_4, PARTNUM, CHIPID, FREQEST, LQI,
    RSSI, MARCSTATE, PKSTATUS, VCO_VC_DAC,
];

/// Find a register by name (case-insensitive)
pub fn lookup(name: &str) -> Option<&'static Register> {
    CONFIG_PAGE.iter().find(|reg| reg.name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_tile_the_page() {
        let mut next = 0usize;
        for reg in CONFIG_PAGE.iter() {
            assert_eq!(reg.span().start, next, "gap or overlap before {}", reg.name);
            next = reg.span().end;
        }
        assert_eq!(next, 62);
    }

    #[test]
    fn test_register_widths() {
        for reg in CONFIG_PAGE.iter() {
            assert!(
                [1, 2, 3, 4, 5, 8].contains(&reg.width),
                "{} has unexpected width {}",
                reg.name,
                reg.width
            );
        }
    }

    #[test]
    fn test_frequency_register_address() {
        assert_eq!(FREQ.address(), 0xDF09);
        assert_eq!(FREQ.span(), 9..12);
        assert!(FREQ.is_reversed());
    }

    #[test]
    fn test_reserved_spans_are_not_reversed() {
        assert!(!Z.is_reversed());
        assert!(!Z_3.is_reversed());
        assert!(!Z_4.is_reversed());
        assert!(!PKTLEN.is_reversed());
        assert!(PA_TABLE.is_reversed());
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("freq"), Some(&FREQ));
        assert_eq!(lookup("VCO_VC_DAC"), Some(&VCO_VC_DAC));
        assert_eq!(lookup("nonexistent"), None);
    }

    #[test]
    fn test_last_register_address() {
        assert_eq!(VCO_VC_DAC.address(), 0xDF3D);
    }
}
