//! Ember TLS
//!
//! This crate provides the TLS 1.0/1.1/1.2 handshake engine for the Ember
//! network stack: a table-driven handshake state machine, a fragment-tolerant
//! handshake message framer with running transcript hashes, and a resumable
//! negotiation loop over non-blocking transports.
//!
//! # Architecture
//!
//! The crate is organized into:
//!
//! - `buffer`: byte buffer with an explicit read cursor (handshake scratch,
//!   record staging)
//! - `record`: plaintext record layer framing over a [`Transport`]
//! - `hash`: parallel MD5/SHA-1/SHA-256/SHA-384 handshake transcript
//! - `suites`: cipher suite identifiers and key-exchange classification
//! - `alert`: alert protocol handling
//! - `session`: session cache integration and resumption
//! - `messages`: handshake message encoders/decoders and per-message handlers
//! - `handshake`: the handshake state machine and negotiation driver
//! - `config`: connection configuration
//! - `connection`: connection state and the public API
//!
//! Negotiation is cooperative: [`Connection::negotiate`] makes as much
//! progress as the transport allows and returns a [`Blocked`] indicator when
//! it would wait; the caller polls the transport and re-invokes.

use core::fmt;
use std::io;

pub mod alert;
pub mod buffer;
pub mod config;
pub mod connection;
pub mod handshake;
pub mod hash;
pub mod messages;
pub mod record;
pub mod session;
pub mod suites;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::TlsConfig;
pub use connection::Connection;
pub use handshake::MessageType;
pub use record::Transport;
pub use session::SessionCache;
pub use suites::CipherSuite;

/// TLS error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsError {
    /// The transport cannot make progress right now. Never escapes
    /// [`Connection::negotiate`]; converted into a [`Blocked`] indicator.
    WouldBlock,
    /// Malformed record framing.
    InvalidRecord,
    /// A handshake message violated the protocol: wrong type for the current
    /// state, out-of-range length, or malformed contents.
    BadMessage,
    /// Finished verify data did not match the transcript.
    BadFinished,
    /// Protocol version not supported.
    UnsupportedVersion,
    /// Cipher suite not supported.
    UnsupportedCipherSuite,
    /// The handshake state machine was consulted with an undefined
    /// handshake-type value or a missing handler.
    InvalidHandshakeState,
    /// Session identifier exceeds the protocol maximum.
    InvalidSessionId,
    /// The peer sent a close_notify or fatal alert; the raw description byte
    /// is carried.
    AlertReceived(u8),
    /// The connection is closed or has been killed by an earlier failure.
    ConnectionClosed,
    /// Transport I/O failure.
    Io(io::ErrorKind),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::WouldBlock => write!(f, "operation would block"),
            TlsError::InvalidRecord => write!(f, "invalid record"),
            TlsError::BadMessage => write!(f, "bad handshake message"),
            TlsError::BadFinished => write!(f, "finished verification failed"),
            TlsError::UnsupportedVersion => write!(f, "unsupported TLS version"),
            TlsError::UnsupportedCipherSuite => write!(f, "unsupported cipher suite"),
            TlsError::InvalidHandshakeState => write!(f, "invalid handshake state"),
            TlsError::InvalidSessionId => write!(f, "invalid session id"),
            TlsError::AlertReceived(desc) => match alert::AlertDescription::from_byte(*desc) {
                Some(d) => write!(f, "alert received: {:?}", d),
                None => write!(f, "alert received: {}", desc),
            },
            TlsError::ConnectionClosed => write!(f, "connection closed"),
            TlsError::Io(kind) => write!(f, "I/O error: {:?}", kind),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<io::Error> for TlsError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => TlsError::WouldBlock,
            io::ErrorKind::UnexpectedEof => TlsError::ConnectionClosed,
            kind => TlsError::Io(kind),
        }
    }
}

/// Connection endpoint role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Server side of the connection.
    Server = 0,
    /// Client side of the connection.
    Client = 1,
}

/// Why a call to [`Connection::negotiate`] returned before the handshake
/// completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocked {
    /// The handshake is complete; nothing is pending.
    NotBlocked,
    /// Progress requires readable data from the peer.
    Read,
    /// Progress requires the transport to accept more bytes.
    Write,
}

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    /// TLS 1.0.
    Tls10,
    /// TLS 1.1.
    Tls11,
    /// TLS 1.2.
    Tls12,
}

impl TlsVersion {
    /// Get the protocol version bytes.
    pub fn to_bytes(&self) -> [u8; 2] {
        match self {
            TlsVersion::Tls10 => [0x03, 0x01],
            TlsVersion::Tls11 => [0x03, 0x02],
            TlsVersion::Tls12 => [0x03, 0x03],
        }
    }

    /// Parse from bytes.
    pub fn from_bytes(bytes: [u8; 2]) -> Option<Self> {
        match bytes {
            [0x03, 0x01] => Some(TlsVersion::Tls10),
            [0x03, 0x02] => Some(TlsVersion::Tls11),
            [0x03, 0x03] => Some(TlsVersion::Tls12),
            _ => None,
        }
    }
}
