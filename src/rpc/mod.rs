//! # RPC Module
//!
//! Request/response protocol spoken by rfcat-compatible firmware over USB bulk.
//!
//! This module handles:
//! - Application and command identifiers
//! - Frame encoding and decoding (4-byte request header, 5-byte response header)
//! - Multi-transfer response reassembly
//! - Correlating responses with the request that produced them

pub mod protocol;
pub mod frame;
pub mod client;
