//! # Radio Configuration Page
//!
//! The 62-byte register page starting at [`BASE`](super::regs::BASE).
//!
//! On the wire, multi-byte registers are stored most-significant byte first.
//! [`RadioConfig`] keeps them least-significant byte first, so that
//! `sum(byte[i] << 8*i)` gives the register value directly. Single-byte
//! registers and the reserved spans are copied unchanged.

use tracing::{debug, info};

use super::regs::{self, Register};
use crate::error::{Result, RfspyError};
use crate::rpc::client::nicebits;

/// Size of the configuration page in bytes
pub const PAGE_LEN: usize = 62;

/// Synthesizer reference frequency in Hz
pub const REFERENCE_HZ: f64 = 2_400_000.0;

/// Fractional resolution of the synthesizer (2^16 steps per reference)
pub const FRACTIONAL_STEPS: f64 = 65536.0;

/// Largest value the 24-bit frequency word holds
pub const MAX_FREQUENCY_WORD: u32 = 0x00FF_FFFF;

/// Register-level device access used to refresh and push fields
pub trait RegisterAccess {
    /// Read `count` bytes starting at `address`
    fn peek(&mut self, address: u16, count: u16) -> Result<Vec<u8>>;

    /// Write `data` at `address`, returning the device acknowledgement
    fn poke(&mut self, address: u16, data: &[u8]) -> Result<Vec<u8>>;
}

/// Convert a frequency word into Hz
pub fn word_to_hz(word: u32) -> f64 {
    f64::from(word) * REFERENCE_HZ / FRACTIONAL_STEPS
}

/// Convert Hz into the nearest frequency word
///
/// # Errors
///
/// Returns `FrequencyOutOfRange` for negative or non-finite input, or when the
/// word would not fit in 24 bits
pub fn hz_to_word(hz: f64) -> Result<u32> {
    if !hz.is_finite() || hz < 0.0 {
        return Err(RfspyError::FrequencyOutOfRange { hz });
    }

    let word = (hz * FRACTIONAL_STEPS / REFERENCE_HZ).round();
    if word > f64::from(MAX_FREQUENCY_WORD) {
        return Err(RfspyError::FrequencyOutOfRange { hz });
    }

    Ok(word as u32)
}

/// Integer value of an LSB-first byte slice
pub fn le_value(bytes: &[u8]) -> u64 {
    bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

/// Decoded radio configuration page
///
/// Multi-byte fields hold their bytes least-significant first. `z`, `z_3` and
/// `z_4` are reserved spans kept exactly as read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioConfig {
    pub sync: [u8; 2],
    pub pktlen: u8,
    pub pktctrl: [u8; 2],
    pub addr: u8,
    pub channr: u8,
    pub fsctrl: [u8; 2],
    pub freq: [u8; 3],
    pub mdmcfg: [u8; 5],
    pub deviatn: u8,
    pub mcsm: [u8; 3],
    pub foccfg: u8,
    pub bscfg: u8,
    pub agcctrl: [u8; 3],
    pub frend: [u8; 2],
    pub fscal: [u8; 4],
    pub z: [u8; 3],
    pub test: [u8; 3],
    pub z_3: [u8; 1],
    pub pa_table: [u8; 8],
    pub iocfg: [u8; 3],
    pub z_4: [u8; 4],
    pub partnum: u8,
    pub chipid: u8,
    pub freqest: u8,
    pub lqi: u8,
    pub rssi: u8,
    pub marcstate: u8,
    pub pkstatus: u8,
    pub vco_vc_dac: u8,
}

fn field<const N: usize>(blob: &[u8; PAGE_LEN], reg: &Register) -> [u8; N] {
    debug_assert_eq!(usize::from(reg.width), N, "{} width", reg.name);
    let mut out = [0u8; N];
    out.copy_from_slice(&blob[reg.span()]);
    if reg.is_reversed() {
        out.reverse();
    }
    out
}

fn byte(blob: &[u8; PAGE_LEN], reg: &Register) -> u8 {
    blob[reg.span().start]
}

fn put(blob: &mut [u8; PAGE_LEN], reg: &Register, value: &[u8]) {
    let dst = &mut blob[reg.span()];
    dst.copy_from_slice(value);
    if reg.is_reversed() {
        dst.reverse();
    }
}

impl RadioConfig {
    /// Understand a configuration page as read from the device
    pub fn deserialize(blob: &[u8; PAGE_LEN]) -> Self {
        Self {
            sync: field(blob, &regs::SYNC),
            pktlen: byte(blob, &regs::PKTLEN),
            pktctrl: field(blob, &regs::PKTCTRL),
            addr: byte(blob, &regs::ADDR),
            channr: byte(blob, &regs::CHANNR),
            fsctrl: field(blob, &regs::FSCTRL),
            freq: field(blob, &regs::FREQ),
            mdmcfg: field(blob, &regs::MDMCFG),
            deviatn: byte(blob, &regs::DEVIATN),
            mcsm: field(blob, &regs::MCSM),
            foccfg: byte(blob, &regs::FOCCFG),
            bscfg: byte(blob, &regs::BSCFG),
            agcctrl: field(blob, &regs::AGCCTRL),
            frend: field(blob, &regs::FREND),
            fscal: field(blob, &regs::FSCAL),
            z: field(blob, &regs::Z),
            test: field(blob, &regs::TEST),
            z_3: field(blob, &regs::Z_3),
            pa_table: field(blob, &regs::PA_TABLE),
            iocfg: field(blob, &regs::IOCFG),
            z_4: field(blob, &regs::Z_4),
            partnum: byte(blob, &regs::PARTNUM),
            chipid: byte(blob, &regs::CHIPID),
            freqest: byte(blob, &regs::FREQEST),
            lqi: byte(blob, &regs::LQI),
            rssi: byte(blob, &regs::RSSI),
            marcstate: byte(blob, &regs::MARCSTATE),
            pkstatus: byte(blob, &regs::PKSTATUS),
            vco_vc_dac: byte(blob, &regs::VCO_VC_DAC),
        }
    }

    /// Deserialize from a slice that must be exactly [`PAGE_LEN`] bytes
    pub fn from_slice(blob: &[u8]) -> Result<Self> {
        let page: &[u8; PAGE_LEN] = blob.try_into().map_err(|_| RfspyError::PageLength {
            expected: PAGE_LEN,
            actual: blob.len(),
        })?;
        Ok(Self::deserialize(page))
    }

    /// The whole page in wire order, suitable for a bulk poke or for sharing
    pub fn serialize(&self) -> [u8; PAGE_LEN] {
        let mut blob = [0u8; PAGE_LEN];
        put(&mut blob, &regs::SYNC, &self.sync);
        put(&mut blob, &regs::PKTLEN, &[self.pktlen]);
        put(&mut blob, &regs::PKTCTRL, &self.pktctrl);
        put(&mut blob, &regs::ADDR, &[self.addr]);
        put(&mut blob, &regs::CHANNR, &[self.channr]);
        put(&mut blob, &regs::FSCTRL, &self.fsctrl);
        put(&mut blob, &regs::FREQ, &self.freq);
        put(&mut blob, &regs::MDMCFG, &self.mdmcfg);
        put(&mut blob, &regs::DEVIATN, &[self.deviatn]);
        put(&mut blob, &regs::MCSM, &self.mcsm);
        put(&mut blob, &regs::FOCCFG, &[self.foccfg]);
        put(&mut blob, &regs::BSCFG, &[self.bscfg]);
        put(&mut blob, &regs::AGCCTRL, &self.agcctrl);
        put(&mut blob, &regs::FREND, &self.frend);
        put(&mut blob, &regs::FSCAL, &self.fscal);
        put(&mut blob, &regs::Z, &self.z);
        put(&mut blob, &regs::TEST, &self.test);
        put(&mut blob, &regs::Z_3, &self.z_3);
        put(&mut blob, &regs::PA_TABLE, &self.pa_table);
        put(&mut blob, &regs::IOCFG, &self.iocfg);
        put(&mut blob, &regs::Z_4, &self.z_4);
        put(&mut blob, &regs::PARTNUM, &[self.partnum]);
        put(&mut blob, &regs::CHIPID, &[self.chipid]);
        put(&mut blob, &regs::FREQEST, &[self.freqest]);
        put(&mut blob, &regs::LQI, &[self.lqi]);
        put(&mut blob, &regs::RSSI, &[self.rssi]);
        put(&mut blob, &regs::MARCSTATE, &[self.marcstate]);
        put(&mut blob, &regs::PKSTATUS, &[self.pkstatus]);
        put(&mut blob, &regs::VCO_VC_DAC, &[self.vco_vc_dac]);
        blob
    }

    /// Wire-order bytes of one register
    pub fn wire_bytes(&self, reg: &Register) -> Vec<u8> {
        self.serialize()[reg.span()].to_vec()
    }

    /// Overwrite one register from wire-order bytes
    pub fn store_wire(&mut self, reg: &Register, wire: &[u8]) -> Result<()> {
        if wire.len() != usize::from(reg.width) {
            return Err(RfspyError::RegisterLength {
                register: reg.name,
                expected: usize::from(reg.width),
                actual: wire.len(),
            });
        }

        let mut blob = self.serialize();
        blob[reg.span()].copy_from_slice(wire);
        *self = Self::deserialize(&blob);
        Ok(())
    }

    /// Sync word value
    pub fn sync_word(&self) -> u16 {
        le_value(&self.sync) as u16
    }

    /// Cached 24-bit frequency word
    pub fn frequency_word(&self) -> u32 {
        le_value(&self.freq) as u32
    }

    /// Replace the cached frequency word (upper byte ignored)
    pub fn set_frequency_word(&mut self, word: u32) {
        let bytes = word.to_le_bytes();
        self.freq.copy_from_slice(&bytes[..3]);
    }

    /// Frequency implied by the cached word, without touching the device
    pub fn cached_frequency_hz(&self) -> f64 {
        word_to_hz(self.frequency_word())
    }

    /// Re-read one register from the device into this page
    pub fn refresh_field<A: RegisterAccess + ?Sized>(&mut self, rpc: &mut A, reg: &Register) -> Result<()> {
        let wire = rpc.peek(reg.address(), u16::from(reg.width))?;
        debug!("refresh {} -> {}", reg.name, nicebits(&wire));
        self.store_wire(reg, &wire)
    }

    /// Write one cached register to the device
    pub fn push_field<A: RegisterAccess + ?Sized>(&self, rpc: &mut A, reg: &Register) -> Result<Vec<u8>> {
        let wire = self.wire_bytes(reg);
        let ack = rpc.poke(reg.address(), &wire)?;
        debug!("push {}({}) -> {}", reg.name, nicebits(&wire), nicebits(&ack));
        Ok(ack)
    }

    /// Read the live synthesizer frequency in Hz
    ///
    /// Always performs a device round-trip; the cached `freq` field is updated
    /// with what was read.
    pub fn current_frequency_hz<A: RegisterAccess + ?Sized>(&mut self, rpc: &mut A) -> Result<f64> {
        info!("retrieving frequency");
        self.refresh_field(rpc, &regs::FREQ)?;

        let hz = self.cached_frequency_hz();
        debug!("frequency: {} Hz = 0x{}", hz, nicebits(&self.freq));
        Ok(hz)
    }

    /// Tune the synthesizer to the word nearest `hz`
    ///
    /// Returns the device acknowledgement of the poke.
    pub fn set_frequency<A: RegisterAccess + ?Sized>(&mut self, rpc: &mut A, hz: f64) -> Result<Vec<u8>> {
        info!("setting frequency to {} Hz", hz);
        let word = hz_to_word(hz)?;
        self.set_frequency_word(word);
        self.push_field(rpc, &regs::FREQ)
    }
}
