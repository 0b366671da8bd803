//! # Radio Module
//!
//! The CC1111 radio configuration page at 0xDF00.
//!
//! This module handles:
//! - The register map (names, offsets, widths)
//! - Decoding and encoding the 62-byte page
//! - Reading and writing the synthesizer frequency on a live device

pub mod regs;
pub mod radiocfg;
