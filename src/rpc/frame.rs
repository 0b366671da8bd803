//! # RPC Frame Codec
//!
//! Builds request frames and takes response frames apart.
//!
//! ```text
//! request:  app(1) | cmd(1) | length(2, LE) | payload[length]
//! response: marker(1) | app(1) | cmd(1) | length(2, LE) | payload[length]
//! ```
//!
//! A response whose length field disagrees with the bytes actually received is
//! still decoded; the disagreement is reported as a [`Diagnostic`].

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::protocol::*;
use crate::error::{Result, RfspyError};

/// Recoverable protocol inconsistency observed on a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// Header length field and received payload size disagree
    #[error("return size mismatch: header declares {declared} bytes, received {actual}")]
    LengthMismatch { declared: u16, actual: usize },

    /// Response answered a different application
    #[error("rpc app mismatch: called 0x{expected:02x}, returned 0x{actual:02x}")]
    AppMismatch { expected: u8, actual: u8 },

    /// Response answered a different command
    #[error("rpc cmd mismatch: called 0x{expected:02x}, returned 0x{actual:02x}")]
    CmdMismatch { expected: u8, actual: u8 },
}

/// A decoded response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Application the device answered for
    pub app: u8,

    /// Command the device answered
    pub cmd: u8,

    /// Payload length announced in the header
    pub declared_len: u16,

    /// Payload bytes actually received
    pub payload: Vec<u8>,
}

impl DecodedFrame {
    /// Length diagnostic, if the payload size disagrees with the header
    pub fn length_diagnostic(&self) -> Option<Diagnostic> {
        if usize::from(self.declared_len) != self.payload.len() {
            Some(Diagnostic::LengthMismatch {
                declared: self.declared_len,
                actual: self.payload.len(),
            })
        } else {
            None
        }
    }

    /// Append payload bytes from a follow-up transfer
    pub fn append(&mut self, more: &[u8]) {
        self.payload.extend_from_slice(more);
    }

    /// Check app/cmd echo against the request that produced this frame
    pub fn correlate(&self, app: u8, cmd: u8) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.app != app {
            diagnostics.push(Diagnostic::AppMismatch { expected: app, actual: self.app });
        }
        if self.cmd != cmd {
            diagnostics.push(Diagnostic::CmdMismatch { expected: cmd, actual: self.cmd });
        }
        diagnostics
    }
}

fn payload_len(payload: &[u8]) -> Result<u16> {
    u16::try_from(payload.len()).map_err(|_| RfspyError::PayloadTooLarge { len: payload.len() })
}

/// Encode a request frame
///
/// # Arguments
///
/// * `app` - Target application
/// * `cmd` - Command within that application
/// * `payload` - Request payload (max 65535 bytes)
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload does not fit the length field
///
/// # Examples
///
/// ```
/// use rfspy::rpc::frame::encode;
/// use rfspy::rpc::protocol::{APP_SYSTEM, sys};
///
/// let frame = encode(APP_SYSTEM, sys::PING, &[0xAA]).unwrap();
/// assert_eq!(frame, vec![0xFF, 0x82, 0x01, 0x00, 0xAA]);
/// ```
pub fn encode(app: u8, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = payload_len(payload)?;

    let mut frame = BytesMut::with_capacity(REQUEST_HEADER_LEN + payload.len());
    frame.put_u8(app);
    frame.put_u8(cmd);
    frame.put_u16_le(len);
    frame.put_slice(payload);

    Ok(frame.to_vec())
}

/// Encode a response frame the way the firmware does
///
/// Only the device produces these; the host uses it to emulate one.
pub fn encode_response(app: u8, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let len = payload_len(payload)?;

    let mut frame = BytesMut::with_capacity(RESPONSE_HEADER_LEN + payload.len());
    frame.put_u8(RESPONSE_MARKER);
    frame.put_u8(app);
    frame.put_u8(cmd);
    frame.put_u16_le(len);
    frame.put_slice(payload);

    Ok(frame.to_vec())
}

/// Decode a response frame
///
/// The payload is every byte after the 5-byte header, whatever the length
/// field says. The marker byte is not checked.
///
/// # Errors
///
/// Returns `FrameTooShort` if fewer than 5 bytes were received
pub fn decode(raw: &[u8]) -> Result<DecodedFrame> {
    if raw.len() < RESPONSE_HEADER_LEN {
        return Err(RfspyError::FrameTooShort { len: raw.len() });
    }

    let mut buf = raw;
    let _marker = buf.get_u8();
    let app = buf.get_u8();
    let cmd = buf.get_u8();
    let declared_len = buf.get_u16_le();

    Ok(DecodedFrame {
        app,
        cmd,
        declared_len,
        payload: buf.to_vec(),
    })
}
