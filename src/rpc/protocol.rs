//! # RPC Protocol Constants
//!
//! Application and command identifiers understood by the dongle firmware,
//! plus the USB timing and sizing constants of the bulk endpoints.

/// Generic application (radio traffic)
pub const APP_GENERIC: u8 = 0x01;

/// Debug application (firmware log strings and values)
pub const APP_DEBUG: u8 = 0xFE;

/// System application (memory access, ping, build info, reset)
pub const APP_SYSTEM: u8 = 0xFF;

/// System application commands
pub mod sys {
    pub const PEEK: u8 = 0x80;
    pub const POKE: u8 = 0x81;
    pub const PING: u8 = 0x82;
    pub const STATUS: u8 = 0x83;
    pub const POKE_REG: u8 = 0x84;
    pub const GET_CLOCK: u8 = 0x85;
    pub const BUILDTYPE: u8 = 0x86;
    pub const BOOTLOADER: u8 = 0x87;
    pub const RFMODE: u8 = 0x88;
    pub const COMPILER: u8 = 0x89;
    pub const PARTNUM: u8 = 0x8E;
    pub const RESET: u8 = 0x8F;
    pub const CLEAR_CODES: u8 = 0x90;
}

/// Debug application commands (device to host)
pub mod debug {
    pub const STRING: u8 = 0xF0;
    pub const HEX: u8 = 0xF1;
    pub const HEX16: u8 = 0xF2;
    pub const HEX32: u8 = 0xF3;
    pub const INT: u8 = 0xF4;
}

/// Request header: app(1) + cmd(1) + length(2)
pub const REQUEST_HEADER_LEN: usize = 4;

/// Response header: marker(1) + app(1) + cmd(1) + length(2)
pub const RESPONSE_HEADER_LEN: usize = 5;

/// Leading byte of every response frame
pub const RESPONSE_MARKER: u8 = b'@';

/// Largest payload the 16-bit length field can describe
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Largest bulk block the firmware handles
pub const USB_MAX_BLOCK_SIZE: usize = 512;

/// Default bulk read timeout in milliseconds
pub const USB_RX_WAIT_MS: u64 = 1000;

/// Default bulk write timeout in milliseconds
pub const USB_TX_WAIT_MS: u64 = 10000;

/// Human-readable name of an application ID, for logs
pub fn app_name(app: u8) -> &'static str {
    match app {
        APP_GENERIC => "generic",
        APP_DEBUG => "debug",
        APP_SYSTEM => "system",
        _ => "unknown",
    }
}
