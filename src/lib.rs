//! # rfspy
//!
//! Host-side driver for rfcat-compatible USB sub-GHz radio dongles.
//!
//! This library provides the RPC framing used by the dongle firmware, a codec
//! for the radio configuration page, and live frequency read/write on top of
//! a blocking USB bulk transport.

pub mod config;
pub mod error;
pub mod radio;
pub mod rpc;
pub mod usb;
