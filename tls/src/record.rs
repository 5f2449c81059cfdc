//! TLS record layer framing.
//!
//! Records are read and written in plaintext framing: a 5-byte header
//! (content type, protocol version, 16-bit length) followed by the fragment.
//! Both directions make resumable partial progress: a read that stops mid
//! header or mid body, or a write that the transport only partially accepts,
//! picks up where it left off on the next call.
//!
//! The first record of a connection may instead be an SSLv2-format
//! ClientHello (high bit set on the first length byte); it is surfaced to the
//! handshake driver with the `is_sslv2` flag and never accepted after the
//! first record.

use std::io;
use std::net::TcpStream;

use crate::connection::Connection;
use crate::TlsError;

/// Record header length: type, version, fragment length.
pub const RECORD_HEADER_LENGTH: usize = 5;

/// Maximum record fragment size (16KB).
pub const MAX_FRAGMENT_SIZE: usize = 16384;

/// Byte stream carrying TLS records, with optional write-coalescing control.
///
/// `cork`/`uncork` map to TCP_CORK/TCP_NOPUSH where the platform has them;
/// the defaults are no-ops, which is always correct, only slower.
pub trait Transport: io::Read + io::Write {
    /// Enable write-coalescing on the underlying socket.
    fn cork(&mut self) {}

    /// Release coalesced writes.
    fn uncork(&mut self) {}

    /// Whether the caller handed us a socket that was already corked.
    fn was_corked(&self) -> bool {
        false
    }
}

impl Transport for TcpStream {}

/// Content type for TLS records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    /// Change cipher spec.
    ChangeCipherSpec = 20,
    /// Alert.
    Alert = 21,
    /// Handshake.
    Handshake = 22,
    /// Application data.
    ApplicationData = 23,
}

impl ContentType {
    /// Parse from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

impl Connection {
    /// Read one full record from the transport.
    ///
    /// Returns the raw content-type byte (unknown types are the driver's to
    /// ignore) and whether the record is an SSLv2-format initial ClientHello.
    /// On return the decrypted fragment is available in `in_buf`; for SSLv2
    /// records the three hashed header bytes sit at offsets 2..5 of
    /// `header_in`.
    pub(crate) fn read_full_record(&mut self) -> Result<(u8, bool), TlsError> {
        while self.header_in.len() < RECORD_HEADER_LENGTH {
            let needed = RECORD_HEADER_LENGTH - self.header_in.len();
            let bytes = self.read_transport(needed)?;
            self.header_in.write(&bytes);
        }

        let header = self.header_in.as_slice();
        let (record_type, fragment_len, is_sslv2) =
            if self.first_record && header[0] & 0x80 != 0 {
                // SSLv2 framing: 15-bit length, then message type and version.
                let total = (((header[0] & 0x7F) as usize) << 8) | header[1] as usize;
                if total < 3 || header[2] != 0x01 {
                    return Err(TlsError::BadMessage);
                }
                (ContentType::Handshake as u8, total - 3, true)
            } else {
                if header[1] != 0x03 {
                    return Err(TlsError::InvalidRecord);
                }
                let len = u16::from_be_bytes([header[3], header[4]]) as usize;
                if len > MAX_FRAGMENT_SIZE {
                    return Err(TlsError::InvalidRecord);
                }
                (header[0], len, false)
            };

        while self.in_buf.len() < fragment_len {
            let bytes = self.read_transport(fragment_len - self.in_buf.len())?;
            self.in_buf.write(&bytes);
        }

        self.first_record = false;
        log::trace!(
            "read record type={} len={} sslv2={}",
            record_type,
            fragment_len,
            is_sslv2
        );
        Ok((record_type, is_sslv2))
    }

    /// Frame `payload` as one record and stage it in the outbound buffer.
    pub(crate) fn record_write(&mut self, record_type: ContentType, payload: &[u8]) {
        debug_assert!(payload.len() <= MAX_FRAGMENT_SIZE);
        let version = self.version.to_bytes();
        self.out_buf.write_u8(record_type as u8);
        self.out_buf.write(&version);
        self.out_buf.write_u16(payload.len() as u16);
        self.out_buf.write(payload);
        log::trace!("staged record type={} len={}", record_type as u8, payload.len());
    }

    /// Largest fragment a single outbound record may carry.
    pub(crate) fn max_write_payload_size(&self) -> usize {
        MAX_FRAGMENT_SIZE
    }

    /// Drain the outbound buffer into the transport.
    pub(crate) fn flush_output(&mut self) -> Result<(), TlsError> {
        while self.out_buf.available() > 0 {
            let pending = self.out_buf.peek().to_vec();
            match self.transport.write(&pending) {
                Ok(0) => return Err(TlsError::Io(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    self.out_buf.take(n);
                }
                Err(err) => return Err(err.into()),
            }
        }
        self.out_buf.wipe();
        match self.transport.flush() {
            Ok(()) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Discard the current record's header and fragment.
    pub(crate) fn wipe_record_buffers(&mut self) {
        self.header_in.wipe();
        self.in_buf.wipe();
    }

    /// Read up to `max` bytes from the transport.
    fn read_transport(&mut self, max: usize) -> Result<Vec<u8>, TlsError> {
        let mut chunk = vec![0u8; max.min(4096)];
        match self.transport.read(&mut chunk) {
            Ok(0) => Err(TlsError::ConnectionClosed),
            Ok(n) => {
                chunk.truncate(n);
                Ok(chunk)
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{chunked_pipe, pipe};
    use crate::{Connection, TlsConfig};

    fn connected_pair() -> (Connection, Connection) {
        let (client_end, server_end) = pipe();
        let client = Connection::new_client(TlsConfig::default(), client_end);
        let server = Connection::new_server(TlsConfig::default(), server_end);
        (client, server)
    }

    #[test]
    fn test_record_roundtrip() {
        let (mut client, mut server) = connected_pair();

        client.record_write(ContentType::Handshake, &[1, 2, 3, 4]);
        client.flush_output().unwrap();

        let (record_type, is_sslv2) = server.read_full_record().unwrap();
        assert_eq!(record_type, ContentType::Handshake as u8);
        assert!(!is_sslv2);
        assert_eq!(server.in_buf.peek(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_partial_reads_resume() {
        let (mut client, mut server) = {
            let (client_end, server_end) = chunked_pipe(1);
            (
                Connection::new_client(TlsConfig::default(), client_end),
                Connection::new_server(TlsConfig::default(), server_end),
            )
        };

        client.record_write(ContentType::Alert, &[2, 40]);
        client.flush_output().unwrap();

        // One byte arrives per read call; the record completes anyway.
        let mut result = server.read_full_record();
        while result == Err(TlsError::WouldBlock) {
            result = server.read_full_record();
        }
        let (record_type, _) = result.unwrap();
        assert_eq!(record_type, ContentType::Alert as u8);
        assert_eq!(server.in_buf.peek(), &[2, 40]);
    }

    #[test]
    fn test_blocked_read_reports_would_block() {
        let (_, mut server) = connected_pair();
        assert_eq!(server.read_full_record(), Err(TlsError::WouldBlock));
    }

    #[test]
    fn test_bad_record_version() {
        let (mut client, mut server) = connected_pair();
        // Hand-craft a record with a bogus version major.
        client.out_buf.write(&[22, 0x07, 0x00, 0x00, 0x01, 0xFF]);
        client.flush_output().unwrap();
        assert_eq!(server.read_full_record(), Err(TlsError::InvalidRecord));
    }

    #[test]
    fn test_oversize_fragment_rejected() {
        let (mut client, mut server) = connected_pair();
        let len = (MAX_FRAGMENT_SIZE + 1) as u16;
        client.out_buf.write(&[22, 0x03, 0x03]);
        client.out_buf.write(&len.to_be_bytes());
        client.flush_output().unwrap();
        assert_eq!(server.read_full_record(), Err(TlsError::InvalidRecord));
    }

    #[test]
    fn test_sslv2_only_on_first_record() {
        let (mut client, mut server) = connected_pair();

        client.record_write(ContentType::Handshake, &[0]);
        client.flush_output().unwrap();
        server.read_full_record().unwrap();
        server.wipe_record_buffers();

        // Same leading byte pattern is no longer treated as SSLv2; the bytes
        // now parse as a TLS header with a bogus version.
        client.out_buf.write(&[0x80, 0x29, 0x01, 0x03, 0x01]);
        client.flush_output().unwrap();
        assert_eq!(server.read_full_record(), Err(TlsError::InvalidRecord));
    }
}
