//! # RPC Client
//!
//! Request/response exchanges with the dongle firmware over a
//! [`BulkTransport`]. One exchange is one write followed by one or two reads;
//! `&mut self` keeps a second exchange from starting before the first one's
//! reads complete.

use std::thread;
use std::time::Duration;

use rand::RngCore;
use tracing::{debug, error, warn};

use super::frame::{self, DecodedFrame, Diagnostic};
use super::protocol::*;
use crate::error::{Result, RfspyError, TransportFault};
use crate::radio::radiocfg::{RadioConfig, RegisterAccess, PAGE_LEN};
use crate::radio::regs::BASE;
use crate::usb::transport::BulkTransport;

/// Render bytes as lowercase hex for log output
pub fn nicebits(bits: &[u8]) -> String {
    bits.iter().map(|b| format!("{:02x}", b)).collect()
}

/// How protocol diagnostics are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcOptions {
    /// Turn any diagnostic into `ProtocolMismatch` instead of logging it
    pub strict: bool,
}

/// Payload of a completed exchange plus everything that looked off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub payload: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// RPC client bound to one device handle
pub struct RpcClient<T: BulkTransport> {
    transport: T,
    options: RpcOptions,
}

impl<T: BulkTransport> std::fmt::Debug for RpcClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("options", &self.options)
            .field("max_payload", &self.transport.max_payload())
            .finish_non_exhaustive()
    }
}

impl<T: BulkTransport> RpcClient<T> {
    /// Create a lenient client
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, RpcOptions::default())
    }

    /// Create a client with explicit diagnostic handling
    pub fn with_options(transport: T, options: RpcOptions) -> Self {
        Self { transport, options }
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give the transport back
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Largest payload one transfer carries
    pub fn max_payload(&self) -> usize {
        self.transport.max_payload()
    }

    /// Run one exchange and return the response payload
    ///
    /// Diagnostics are logged and the payload returned anyway, unless the
    /// client is strict.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be encoded, a transfer fails, the
    /// response is shorter than its header, or (strict only) a diagnostic was
    /// raised.
    pub fn exchange(&mut self, app: u8, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(self.exchange_reply(app, cmd, payload)?.payload)
    }

    /// Run one exchange and return the payload together with its diagnostics
    pub fn exchange_reply(&mut self, app: u8, cmd: u8, payload: &[u8]) -> Result<Reply> {
        self.send(app, cmd, payload)?;
        let frame = self.read_response()?;
        self.finish(app, cmd, frame)
    }

    /// Run one exchange on the symmetric path
    ///
    /// Reads a single transfer exactly one byte longer than the request
    /// frame, which is where an echoing command's response ends.
    pub fn exchange_symmetric(&mut self, app: u8, cmd: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let request_len = self.send(app, cmd, payload)?;
        let raw = self.transport.read(request_len + 1)?;
        let frame = frame::decode(&raw)?;
        Ok(self.finish(app, cmd, frame)?.payload)
    }

    fn send(&mut self, app: u8, cmd: u8, payload: &[u8]) -> Result<usize> {
        let request = frame::encode(app, cmd, payload)?;
        let written = self.transport.write(&request)?;
        debug!(
            "rpc {}/0x{:02x}: attempted {}, wrote {}",
            app_name(app),
            cmd,
            request.len(),
            written
        );
        if written < request.len() {
            return Err(TransportFault::ShortWrite {
                expected: request.len(),
                written,
            }
            .into());
        }
        Ok(request.len())
    }

    fn read_response(&mut self) -> Result<DecodedFrame> {
        let unit = self.transport.max_transfer_unit();
        let first = self.transport.read(unit)?;
        let mut frame = frame::decode(&first)?;

        let room = unit.saturating_sub(RESPONSE_HEADER_LEN);
        if usize::from(frame.declared_len) > room {
            debug!(
                "response declares {} bytes, first transfer holds {}; reading again",
                frame.declared_len, room
            );
            let rest = self.transport.read(unit)?;
            frame.append(&rest);
        }

        Ok(frame)
    }

    fn finish(&self, app: u8, cmd: u8, frame: DecodedFrame) -> Result<Reply> {
        let mut diagnostics = frame.correlate(app, cmd);
        diagnostics.extend(frame.length_diagnostic());

        for diagnostic in &diagnostics {
            warn!("{}", diagnostic);
        }
        if self.options.strict {
            if let Some(&diagnostic) = diagnostics.first() {
                return Err(RfspyError::ProtocolMismatch(diagnostic));
            }
        }

        Ok(Reply {
            payload: frame.payload,
            diagnostics,
        })
    }

    /// Read `count` bytes of device memory starting at `address`
    pub fn peek(&mut self, address: u16, count: u16) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(4);
        payload.extend_from_slice(&count.to_le_bytes());
        payload.extend_from_slice(&address.to_le_bytes());
        self.exchange(APP_SYSTEM, sys::PEEK, &payload)
    }

    /// Write `data` to device memory at `address`; returns the acknowledgement
    pub fn poke(&mut self, address: u16, data: &[u8]) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(2 + data.len());
        payload.extend_from_slice(&address.to_le_bytes());
        payload.extend_from_slice(data);
        self.exchange(APP_SYSTEM, sys::POKE, &payload)
    }

    /// Ping with `payload` and check the echo
    ///
    /// Returns `Ok(false)` when the echo differs from what was sent. No retry
    /// is made.
    pub fn ping_symmetric(&mut self, payload: &[u8]) -> Result<bool> {
        debug!("ping with 0x{}", nicebits(payload));
        let echo = self.exchange_symmetric(APP_SYSTEM, sys::PING, payload)?;

        if echo == payload {
            debug!("pong okay");
            Ok(true)
        } else {
            error!("ping failed!");
            debug!("expected 0x{}, recv'd 0x{}", nicebits(payload), nicebits(&echo));
            Ok(false)
        }
    }

    /// Ping with `payload`, or with `max_payload` random bytes when `None`
    pub fn ping(&mut self, payload: Option<&[u8]>) -> Result<bool> {
        match payload {
            Some(payload) => self.ping_symmetric(payload),
            None => {
                let mut random = vec![0u8; self.max_payload()];
                rand::thread_rng().fill_bytes(&mut random);
                self.ping_symmetric(&random)
            }
        }
    }

    /// Ping `times` times, sleeping `interval` between pings
    ///
    /// `times == 0` keeps pinging until the first failure, which makes it
    /// return `Ok(false)` only.
    pub fn ping_repeat(&mut self, payload: Option<&[u8]>, times: usize, interval: Duration) -> Result<bool> {
        if times == 0 {
            while self.ping(payload)? {
                thread::sleep(interval);
            }
            return Ok(false);
        }

        for _ in 0..times {
            if !self.ping(payload)? {
                return Ok(false);
            }
            if times != 1 {
                thread::sleep(interval);
            }
        }
        Ok(true)
    }

    /// Firmware build string (null-terminated on the wire)
    pub fn get_build_info(&mut self) -> Result<String> {
        let mut raw = self.exchange(APP_SYSTEM, sys::BUILDTYPE, &[])?;
        while raw.last() == Some(&0) {
            raw.pop();
        }
        if !raw.is_ascii() {
            return Err(RfspyError::InvalidBuildInfo);
        }
        String::from_utf8(raw).map_err(|_| RfspyError::InvalidBuildInfo)
    }

    /// Fetch the whole radio configuration page
    ///
    /// The page is read with one peek when it fits in a transfer, otherwise
    /// with two.
    pub fn get_radio_config(&mut self) -> Result<RadioConfig> {
        let max_payload = self.max_payload();
        let requests: Vec<(u16, usize)> = if PAGE_LEN > max_payload {
            vec![
                (BASE, max_payload),
                (BASE + max_payload as u16, PAGE_LEN - max_payload),
            ]
        } else {
            vec![(BASE, PAGE_LEN)]
        };

        let mut page = Vec::with_capacity(PAGE_LEN);
        for (address, count) in requests {
            page.extend(self.peek(address, count as u16)?);
        }
        RadioConfig::from_slice(&page)
    }
}

impl<T: BulkTransport> RegisterAccess for RpcClient<T> {
    fn peek(&mut self, address: u16, count: u16) -> Result<Vec<u8>> {
        RpcClient::peek(self, address, count)
    }

    fn poke(&mut self, address: u16, data: &[u8]) -> Result<Vec<u8>> {
        RpcClient::poke(self, address, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::frame::encode_response;
    use crate::usb::transport::mocks::MockBulkTransport;

    const PACKET: usize = 64;

    fn client() -> RpcClient<MockBulkTransport> {
        RpcClient::new(MockBulkTransport::new(PACKET))
    }

    fn respond(client: &mut RpcClient<MockBulkTransport>, app: u8, cmd: u8, payload: &[u8]) {
        client
            .transport_mut()
            .queue_read(encode_response(app, cmd, payload).unwrap());
    }

    #[test]
    fn test_nicebits() {
        assert_eq!(nicebits(&[0x00, 0xAB, 0x10]), "00ab10");
        assert_eq!(nicebits(&[]), "");
    }

    #[test]
    fn test_exchange_writes_request_and_returns_payload() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::STATUS, &[0x01, 0x02]);

        let payload = client.exchange(APP_SYSTEM, sys::STATUS, &[0x07]).unwrap();
        assert_eq!(payload, vec![0x01, 0x02]);

        let transport = client.transport();
        assert_eq!(transport.written, vec![vec![0xFF, 0x83, 0x01, 0x00, 0x07]]);
        assert_eq!(transport.read_requests, vec![PACKET]);
    }

    #[test]
    fn test_exchange_reassembles_two_transfers() {
        let mut client = client();
        let payload: Vec<u8> = (0..100u8).collect();
        let raw = encode_response(APP_SYSTEM, sys::PEEK, &payload).unwrap();
        client.transport_mut().queue_read(raw[..PACKET].to_vec());
        client.transport_mut().queue_read(raw[PACKET..].to_vec());

        let reply = client.exchange_reply(APP_SYSTEM, sys::PEEK, &[]).unwrap();
        assert_eq!(reply.payload.len(), 100);
        assert_eq!(reply.payload, payload);
        assert!(reply.diagnostics.is_empty());
        assert_eq!(client.transport().read_requests, vec![PACKET, PACKET]);
    }

    #[test]
    fn test_exchange_single_read_when_payload_fits() {
        let mut client = client();
        let payload = vec![0x11u8; PACKET - RESPONSE_HEADER_LEN];
        respond(&mut client, APP_SYSTEM, sys::PEEK, &payload);

        let reply = client.exchange_reply(APP_SYSTEM, sys::PEEK, &[]).unwrap();
        assert_eq!(reply.payload, payload);
        assert_eq!(client.transport().read_requests.len(), 1);
    }

    #[test]
    fn test_exchange_never_reads_a_third_time() {
        let mut client = client();
        let raw = encode_response(APP_SYSTEM, sys::PEEK, &[0x22u8; 200]).unwrap();
        for chunk in raw.chunks(PACKET) {
            client.transport_mut().queue_read(chunk.to_vec());
        }

        let reply = client.exchange_reply(APP_SYSTEM, sys::PEEK, &[]).unwrap();
        assert_eq!(reply.payload.len(), 2 * PACKET - RESPONSE_HEADER_LEN);
        assert_eq!(
            reply.diagnostics,
            vec![Diagnostic::LengthMismatch { declared: 200, actual: 123 }]
        );
        assert_eq!(client.transport().read_requests.len(), 2);
    }

    #[test]
    fn test_exchange_tolerates_echo_mismatch() {
        let mut client = client();
        respond(&mut client, APP_DEBUG, sys::POKE, &[0xAA]);

        let reply = client.exchange_reply(APP_SYSTEM, sys::PEEK, &[]).unwrap();
        assert_eq!(reply.payload, vec![0xAA]);
        assert_eq!(
            reply.diagnostics,
            vec![
                Diagnostic::AppMismatch { expected: APP_SYSTEM, actual: APP_DEBUG },
                Diagnostic::CmdMismatch { expected: sys::PEEK, actual: sys::POKE },
            ]
        );
    }

    #[test]
    fn test_exchange_tolerates_short_payload() {
        let mut client = client();
        let mut raw = vec![RESPONSE_MARKER, APP_SYSTEM, sys::PEEK, 10, 0];
        raw.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        client.transport_mut().queue_read(raw);

        let payload = client.exchange(APP_SYSTEM, sys::PEEK, &[]).unwrap();
        assert_eq!(payload, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_strict_client_rejects_mismatch() {
        let mut client = RpcClient::with_options(MockBulkTransport::new(PACKET), RpcOptions { strict: true });
        respond(&mut client, APP_SYSTEM, sys::POKE, &[]);

        match client.exchange(APP_SYSTEM, sys::PEEK, &[]) {
            Err(RfspyError::ProtocolMismatch(Diagnostic::CmdMismatch { expected, actual })) => {
                assert_eq!(expected, sys::PEEK);
                assert_eq!(actual, sys::POKE);
            }
            other => panic!("Expected ProtocolMismatch, got: {:?}", other),
        }
    }

    #[test]
    fn test_exchange_short_response_is_an_error() {
        let mut client = client();
        client.transport_mut().queue_read(vec![RESPONSE_MARKER, APP_SYSTEM]);
        assert!(matches!(
            client.exchange(APP_SYSTEM, sys::PEEK, &[]),
            Err(RfspyError::FrameTooShort { len: 2 })
        ));
    }

    #[test]
    fn test_exchange_propagates_transport_faults() {
        let mut client = client();
        client.transport_mut().queue_fault(TransportFault::NoDevice);
        assert!(matches!(
            client.exchange(APP_SYSTEM, sys::STATUS, &[]),
            Err(RfspyError::Transport(TransportFault::NoDevice))
        ));

        client.transport_mut().write_error = Some(|| TransportFault::Timeout);
        assert!(matches!(
            client.exchange(APP_SYSTEM, sys::STATUS, &[]),
            Err(RfspyError::Transport(TransportFault::Timeout))
        ));
    }

    #[test]
    fn test_short_write_is_a_transport_fault() {
        let mut client = RpcClient::with_options(MockBulkTransport::new(PACKET), RpcOptions { strict: true });
        client.transport_mut().write_limit = Some(1);
        respond(&mut client, APP_SYSTEM, sys::POKE, &[0]);

        match client.poke(0xDF09, &[1, 2, 3]) {
            Err(RfspyError::Transport(TransportFault::ShortWrite { expected, written })) => {
                assert_eq!(expected, 9);
                assert_eq!(written, 1);
            }
            other => panic!("Expected ShortWrite, got: {:?}", other),
        }
        // no response is read for a truncated request
        assert!(client.transport().read_requests.is_empty());
    }

    #[test]
    fn test_exchange_rejects_oversized_payload_before_writing() {
        let mut client = client();
        let payload = vec![0u8; 65536];
        assert!(matches!(
            client.exchange(APP_SYSTEM, sys::POKE, &payload),
            Err(RfspyError::PayloadTooLarge { .. })
        ));
        assert!(client.transport().written.is_empty());
    }

    #[test]
    fn test_peek_payload_layout() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::PEEK, &[0x10, 0xA3, 0xCA]);

        let data = client.peek(0xDF09, 3).unwrap();
        assert_eq!(data, vec![0x10, 0xA3, 0xCA]);
        assert_eq!(
            client.transport().written[0],
            vec![0xFF, 0x80, 0x04, 0x00, 0x03, 0x00, 0x09, 0xDF]
        );
    }

    #[test]
    fn test_poke_payload_layout() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::POKE, &[0x00]);

        let ack = client.poke(0xDF09, &[0x21, 0x62, 0x76]).unwrap();
        assert_eq!(ack, vec![0x00]);
        assert_eq!(
            client.transport().written[0],
            vec![0xFF, 0x81, 0x05, 0x00, 0x09, 0xDF, 0x21, 0x62, 0x76]
        );
    }

    #[test]
    fn test_ping_symmetric_matching_echo() {
        let mut client = client();
        let payload: Vec<u8> = (0..59u8).collect();
        respond(&mut client, APP_SYSTEM, sys::PING, &payload);

        assert!(client.ping_symmetric(&payload).unwrap());
        // request frame is 4 + 59 bytes; the echo is read in one transfer of 64
        assert_eq!(client.transport().read_requests, vec![64]);
    }

    #[test]
    fn test_ping_symmetric_detects_single_byte_difference() {
        let payload = vec![0x5Au8; 16];
        for index in [0, 7, 15] {
            let mut client = client();
            let mut echo = payload.clone();
            echo[index] ^= 0x01;
            respond(&mut client, APP_SYSTEM, sys::PING, &echo);

            assert!(!client.ping_symmetric(&payload).unwrap());
            assert_eq!(client.transport().written.len(), 1, "ping must not retry");
        }
    }

    #[test]
    fn test_ping_symmetric_detects_truncated_echo() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::PING, &[1, 2, 3]);
        assert!(!client.ping_symmetric(&[1, 2, 3, 4]).unwrap());
    }

    #[test]
    fn test_ping_random_payload_uses_max_payload() {
        let mut client = client();
        // Echo whatever the request carried
        respond(&mut client, APP_SYSTEM, sys::PING, &[]);
        let _ = client.ping(None).unwrap();

        let request = &client.transport().written[0];
        assert_eq!(request.len(), REQUEST_HEADER_LEN + PACKET - RESPONSE_HEADER_LEN);
        assert_eq!(u16::from_le_bytes([request[2], request[3]]), 59);
    }

    #[test]
    fn test_ping_repeat_stops_at_first_failure() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::PING, &[9]);
        respond(&mut client, APP_SYSTEM, sys::PING, &[8]);
        respond(&mut client, APP_SYSTEM, sys::PING, &[9]);

        let ok = client.ping_repeat(Some(&[9]), 3, Duration::ZERO).unwrap();
        assert!(!ok);
        assert_eq!(client.transport().written.len(), 2);
    }

    #[test]
    fn test_ping_repeat_until_failure() {
        let mut client = client();
        for _ in 0..4 {
            respond(&mut client, APP_SYSTEM, sys::PING, &[1]);
        }
        respond(&mut client, APP_SYSTEM, sys::PING, &[2]);

        assert!(!client.ping_repeat(Some(&[1]), 0, Duration::ZERO).unwrap());
        assert_eq!(client.transport().written.len(), 5);
    }

    #[test]
    fn test_ping_repeat_all_succeed() {
        let mut client = client();
        for _ in 0..3 {
            respond(&mut client, APP_SYSTEM, sys::PING, &[7, 7]);
        }
        assert!(client.ping_repeat(Some(&[7, 7]), 3, Duration::ZERO).unwrap());
    }

    #[test]
    fn test_get_build_info_strips_trailing_nulls() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::BUILDTYPE, b"YARDSTICKONE r0543\0\0\0");

        assert_eq!(client.get_build_info().unwrap(), "YARDSTICKONE r0543");
        assert_eq!(client.transport().written[0], vec![0xFF, 0x86, 0x00, 0x00]);
    }

    #[test]
    fn test_get_build_info_rejects_non_ascii() {
        let mut client = client();
        respond(&mut client, APP_SYSTEM, sys::BUILDTYPE, &[b'o', b'k', 0xC3, 0xA9, 0x00]);
        assert!(matches!(client.get_build_info(), Err(RfspyError::InvalidBuildInfo)));
    }

    #[test]
    fn test_get_radio_config_splits_large_page() {
        let mut client = client();
        let blob: Vec<u8> = (0..PAGE_LEN as u8).collect();
        respond(&mut client, APP_SYSTEM, sys::PEEK, &blob[..59]);
        respond(&mut client, APP_SYSTEM, sys::PEEK, &blob[59..]);

        let config = client.get_radio_config().unwrap();
        assert_eq!(config.serialize().to_vec(), blob);

        let written = &client.transport().written;
        assert_eq!(written.len(), 2);
        // count 59 @ 0xDF00, then count 3 @ 0xDF3B
        assert_eq!(&written[0][4..], &[59, 0, 0x00, 0xDF]);
        assert_eq!(&written[1][4..], &[3, 0, 0x3B, 0xDF]);
    }

    #[test]
    fn test_get_radio_config_single_peek_on_large_endpoint() {
        let mut client = RpcClient::new(MockBulkTransport::new(512));
        let blob = vec![0x42u8; PAGE_LEN];
        respond(&mut client, APP_SYSTEM, sys::PEEK, &blob);

        let config = client.get_radio_config().unwrap();
        assert_eq!(config.serialize().to_vec(), blob);
        assert_eq!(client.transport().written.len(), 1);
    }

    #[test]
    fn test_get_radio_config_short_page() {
        let mut client = RpcClient::new(MockBulkTransport::new(512));
        respond(&mut client, APP_SYSTEM, sys::PEEK, &[0u8; 40]);
        assert!(matches!(
            client.get_radio_config(),
            Err(RfspyError::PageLength { expected: 62, actual: 40 })
        ));
    }
}
