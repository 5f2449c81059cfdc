//! Handshake state machine and negotiation driver.
//!
//! The handshake is driven from two static tables: an action table mapping
//! each logical message to its record type, wire message type, writing peer
//! and handler pair, and a shape table mapping the negotiated handshake-type
//! bits to the ordered message sequence. The sequences end in an
//! application-data sentinel whose writer is `Both`; reaching it terminates
//! negotiation.
//!
//! Everything here is resumable: any blocking I/O unwinds to the caller of
//! [`Connection::negotiate`] with a [`Blocked`] indicator, and a later call
//! re-enters the loop at the same message. The scratch buffer's wiped flag
//! keeps the write path from re-encoding a message after a blocked flush, and
//! the read path accumulates fragments across records until a message
//! completes.

use bitflags::bitflags;

use crate::buffer::Buffer;
use crate::connection::Connection;
use crate::hash::TranscriptHash;
use crate::messages::{self, FINISHED_VERIFY_LEN};
use crate::record::ContentType;
use crate::session;
use crate::suites::KeyExchange;
use crate::{Blocked, Mode, TlsError};

/// Handshake message header: type byte plus 24-bit length.
pub(crate) const TLS_HANDSHAKE_HEADER_LENGTH: usize = 4;

/// Upper bound on a single handshake message, header excluded.
pub(crate) const MAX_HANDSHAKE_MESSAGE_LENGTH: usize = 64 * 1024;

// Handshake message types from RFC 5246 7.4.
const TLS_CLIENT_HELLO: u8 = 1;
const TLS_SERVER_HELLO: u8 = 2;
const TLS_SERVER_CERT: u8 = 11;
const TLS_SERVER_KEY: u8 = 12;
const TLS_SERVER_CERT_REQ: u8 = 13;
const TLS_SERVER_HELLO_DONE: u8 = 14;
const TLS_CLIENT_CERT: u8 = 11;
const TLS_CLIENT_CERT_VERIFY: u8 = 15;
const TLS_CLIENT_KEY: u8 = 16;
const TLS_FINISHED: u8 = 20;
const TLS_SERVER_CERT_STATUS: u8 = 22;

bitflags! {
    /// Negotiated handshake kind. Empty until ServerHello is processed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HandshakeType: u8 {
        /// Cipher suite and resumption outcome are settled.
        const NEGOTIATED = 0b00001;
        /// Certificate and key-exchange messages are exchanged.
        const FULL_HANDSHAKE = 0b00010;
        /// The key exchange is ephemeral; ServerKeyExchange is sent.
        const PERFECT_FORWARD_SECRECY = 0b00100;
        /// The server sends a CertificateStatus response.
        const OCSP_STATUS = 0b01000;
        /// A cached session is being resumed.
        const RESUME = 0b10000;
    }
}

impl HandshakeType {
    /// State before ServerHello is processed.
    pub const INITIAL: HandshakeType = HandshakeType::empty();
}

/// Which peer writes the current message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Writer {
    Client,
    Server,
    /// The application-data sentinel; nobody writes, the handshake is over.
    Both,
}

impl Writer {
    pub(crate) fn from_mode(mode: Mode) -> Writer {
        match mode {
            Mode::Server => Writer::Server,
            Mode::Client => Writer::Client,
        }
    }
}

/// Logical handshake messages, in action-table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    ClientHello = 0,
    ServerHello,
    ServerCert,
    ServerCertStatus,
    ServerKey,
    ServerCertReq,
    ServerHelloDone,
    ClientCert,
    ClientKey,
    ClientCertVerify,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
}

pub(crate) type Handler = fn(&mut Connection) -> Result<(), TlsError>;

/// Static per-message dispatch: record type, wire message type, writing peer
/// and the server/client handler pair.
pub(crate) struct HandshakeAction {
    pub(crate) record_type: ContentType,
    pub(crate) message_type: u8,
    pub(crate) writer: Writer,
    /// Indexed by [`Mode`]: server handler first, client handler second.
    pub(crate) handlers: [Option<Handler>; 2],
}

static STATE_MACHINE: [HandshakeAction; 15] = [
    // ClientHello
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_CLIENT_HELLO,
        writer: Writer::Client,
        handlers: [Some(messages::client_hello_recv), Some(messages::client_hello_send)],
    },
    // ServerHello
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_SERVER_HELLO,
        writer: Writer::Server,
        handlers: [Some(messages::server_hello_send), Some(messages::server_hello_recv)],
    },
    // ServerCert
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_SERVER_CERT,
        writer: Writer::Server,
        handlers: [Some(messages::server_cert_send), Some(messages::server_cert_recv)],
    },
    // ServerCertStatus
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_SERVER_CERT_STATUS,
        writer: Writer::Server,
        handlers: [Some(messages::server_status_send), Some(messages::server_status_recv)],
    },
    // ServerKey
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_SERVER_KEY,
        writer: Writer::Server,
        handlers: [Some(messages::server_key_send), Some(messages::server_key_recv)],
    },
    // ServerCertReq: client certificates are not supported.
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_SERVER_CERT_REQ,
        writer: Writer::Server,
        handlers: [None, None],
    },
    // ServerHelloDone
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_SERVER_HELLO_DONE,
        writer: Writer::Server,
        handlers: [Some(messages::server_done_send), Some(messages::server_done_recv)],
    },
    // ClientCert: client certificates are not supported.
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_CLIENT_CERT,
        writer: Writer::Client,
        handlers: [None, None],
    },
    // ClientKey
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_CLIENT_KEY,
        writer: Writer::Client,
        handlers: [Some(messages::client_key_recv), Some(messages::client_key_send)],
    },
    // ClientCertVerify: client certificates are not supported.
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_CLIENT_CERT_VERIFY,
        writer: Writer::Client,
        handlers: [None, None],
    },
    // ClientChangeCipherSpec
    HandshakeAction {
        record_type: ContentType::ChangeCipherSpec,
        message_type: 0,
        writer: Writer::Client,
        handlers: [Some(messages::client_ccs_recv), Some(messages::client_ccs_send)],
    },
    // ClientFinished
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_FINISHED,
        writer: Writer::Client,
        handlers: [Some(messages::client_finished_recv), Some(messages::client_finished_send)],
    },
    // ServerChangeCipherSpec
    HandshakeAction {
        record_type: ContentType::ChangeCipherSpec,
        message_type: 0,
        writer: Writer::Server,
        handlers: [Some(messages::server_ccs_send), Some(messages::server_ccs_recv)],
    },
    // ServerFinished
    HandshakeAction {
        record_type: ContentType::Handshake,
        message_type: TLS_FINISHED,
        writer: Writer::Server,
        handlers: [Some(messages::server_finished_send), Some(messages::server_finished_recv)],
    },
    // ApplicationData
    HandshakeAction {
        record_type: ContentType::ApplicationData,
        message_type: 0,
        writer: Writer::Both,
        handlers: [None, None],
    },
];

use MessageType::*;

static INITIAL_SEQUENCE: &[MessageType] = &[ClientHello, ServerHello];

static RESUME_SEQUENCE: &[MessageType] = &[
    ClientHello,
    ServerHello,
    ServerChangeCipherSpec,
    ServerFinished,
    ClientChangeCipherSpec,
    ClientFinished,
    ApplicationData,
];

static FULL_SEQUENCE: &[MessageType] = &[
    ClientHello,
    ServerHello,
    ServerCert,
    ServerHelloDone,
    ClientKey,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
];

static FULL_PFS_SEQUENCE: &[MessageType] = &[
    ClientHello,
    ServerHello,
    ServerCert,
    ServerKey,
    ServerHelloDone,
    ClientKey,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
];

static FULL_OCSP_SEQUENCE: &[MessageType] = &[
    ClientHello,
    ServerHello,
    ServerCert,
    ServerCertStatus,
    ServerHelloDone,
    ClientKey,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
];

static FULL_PFS_OCSP_SEQUENCE: &[MessageType] = &[
    ClientHello,
    ServerHello,
    ServerCert,
    ServerCertStatus,
    ServerKey,
    ServerHelloDone,
    ClientKey,
    ClientChangeCipherSpec,
    ClientFinished,
    ServerChangeCipherSpec,
    ServerFinished,
    ApplicationData,
];

/// Message ordering for a negotiated handshake type. Only the six defined
/// combinations are valid; anything else is a state-machine bug surfaced as
/// an error.
pub(crate) fn message_sequence(
    handshake_type: HandshakeType,
) -> Result<&'static [MessageType], TlsError> {
    let full = HandshakeType::NEGOTIATED | HandshakeType::FULL_HANDSHAKE;
    if handshake_type == HandshakeType::INITIAL {
        Ok(INITIAL_SEQUENCE)
    } else if handshake_type == HandshakeType::NEGOTIATED | HandshakeType::RESUME {
        Ok(RESUME_SEQUENCE)
    } else if handshake_type == full {
        Ok(FULL_SEQUENCE)
    } else if handshake_type == full | HandshakeType::PERFECT_FORWARD_SECRECY {
        Ok(FULL_PFS_SEQUENCE)
    } else if handshake_type == full | HandshakeType::OCSP_STATUS {
        Ok(FULL_OCSP_SEQUENCE)
    } else if handshake_type
        == full | HandshakeType::PERFECT_FORWARD_SECRECY | HandshakeType::OCSP_STATUS
    {
        Ok(FULL_PFS_OCSP_SEQUENCE)
    } else {
        Err(TlsError::InvalidHandshakeState)
    }
}

/// Per-connection handshake state.
pub(crate) struct HandshakeState {
    pub(crate) handshake_type: HandshakeType,
    /// Index into the active message sequence. Monotonic for the life of the
    /// connection.
    pub(crate) message_number: usize,
    /// Scratch buffer holding exactly one in-flight handshake message.
    pub(crate) io: Buffer,
    pub(crate) transcript: TranscriptHash,
    /// Expected ClientFinished verify data, pinned at the CCS boundary.
    pub(crate) client_verify: [u8; FINISHED_VERIFY_LEN],
    /// Expected ServerFinished verify data, pinned at the CCS boundary.
    pub(crate) server_verify: [u8; FINISHED_VERIFY_LEN],
}

impl HandshakeState {
    pub(crate) fn new() -> Self {
        Self {
            handshake_type: HandshakeType::INITIAL,
            message_number: 0,
            io: Buffer::new(),
            transcript: TranscriptHash::new(),
            client_verify: [0u8; FINISHED_VERIFY_LEN],
            server_verify: [0u8; FINISHED_VERIFY_LEN],
        }
    }
}

/// Outcome of one attempt to assemble a handshake message from the current
/// record.
pub(crate) enum ReadResult {
    /// A whole message is in the scratch buffer; its wire type is carried.
    Done(u8),
    /// The record ran out before the message completed; read another record.
    NeedMore,
}

impl Connection {
    /// The message the state machine expects next.
    pub(crate) fn active_message(&self) -> Result<MessageType, TlsError> {
        let sequence = message_sequence(self.handshake.handshake_type)?;
        sequence
            .get(self.handshake.message_number)
            .copied()
            .ok_or(TlsError::InvalidHandshakeState)
    }

    pub(crate) fn active_action(&self) -> Result<&'static HandshakeAction, TlsError> {
        Ok(&STATE_MACHINE[self.active_message()? as usize])
    }

    fn previous_action(&self) -> Result<&'static HandshakeAction, TlsError> {
        let sequence = message_sequence(self.handshake.handshake_type)?;
        let previous = sequence
            .get(self.handshake.message_number - 1)
            .copied()
            .ok_or(TlsError::InvalidHandshakeState)?;
        Ok(&STATE_MACHINE[previous as usize])
    }

    /// The message the handshake is currently positioned at.
    pub fn current_message(&self) -> Result<MessageType, TlsError> {
        self.active_message()
    }

    /// Whether negotiation has reached the application-data stage.
    pub fn is_established(&self) -> bool {
        matches!(self.active_action().map(|action| action.writer), Ok(Writer::Both))
    }

    /// Move to the next message, adjusting write coalescing when the I/O
    /// direction flips: cork when this side becomes the writer, uncork when
    /// the peer does or when the handshake ends.
    pub(crate) fn advance_message(&mut self) -> Result<(), TlsError> {
        self.handshake.message_number += 1;

        // Leave the socket alone unless we manage coalescing, and never
        // fight a caller that corked it first.
        if !self.corked_io || self.was_corked {
            return Ok(());
        }

        let active_writer = self.active_action()?.writer;
        if active_writer == self.previous_action()?.writer {
            return Ok(());
        }

        if active_writer == Writer::from_mode(self.mode) {
            log::trace!("direction change: corking");
            self.transport.cork();
        } else {
            log::trace!("direction change: uncorking");
            self.transport.uncork();
        }
        Ok(())
    }

    /// Pick the handshake shape. Runs from the ServerHello handlers, once
    /// cipher suite and resumption outcome are known on both sides.
    pub(crate) fn set_handshake_type(&mut self) -> Result<(), TlsError> {
        self.handshake.handshake_type = HandshakeType::NEGOTIATED;

        if self.config.caching_enabled() {
            if session::resume_from_cache(self) {
                self.handshake.handshake_type |= HandshakeType::RESUME;
                log::debug!("resuming cached session");
                return Ok(());
            }

            if self.mode == Mode::Server {
                session::generate_session_id(self);
            }
        }

        self.handshake.handshake_type |= HandshakeType::FULL_HANDSHAKE;

        if let Some(suite) = self.cipher_suite {
            if suite.key_exchange().contains(KeyExchange::EPHEMERAL) {
                self.handshake.handshake_type |= HandshakeType::PERFECT_FORWARD_SECRECY;
            }
        }

        if self.server_can_send_ocsp() {
            self.handshake.handshake_type |= HandshakeType::OCSP_STATUS;
        }

        log::debug!("handshake type: {:?}", self.handshake.handshake_type);
        Ok(())
    }

    /// Whether a CertificateStatus message will be part of this handshake.
    fn server_can_send_ocsp(&self) -> bool {
        match self.mode {
            Mode::Server => self.status_requested && !self.config.ocsp_response.is_empty(),
            Mode::Client => self.status_expected,
        }
    }

    fn handshake_write_header(&mut self, message_type: u8) {
        self.handshake.io.write_u8(message_type);
        self.handshake.io.write_u24(0);
    }

    fn handshake_finish_header(&mut self) {
        let payload_len = (self.handshake.io.len() - TLS_HANDSHAKE_HEADER_LENGTH) as u32;
        self.handshake.io.overwrite(
            1,
            &[
                ((payload_len >> 16) & 0xFF) as u8,
                ((payload_len >> 8) & 0xFF) as u8,
                (payload_len & 0xFF) as u8,
            ],
        );
    }

    /// Write the current message out as records.
    ///
    /// A message may fragment across several records but is never coalesced
    /// with the next message. The message is encoded into the scratch buffer
    /// exactly once; a blocked flush returns to the caller and a later call
    /// resumes draining the same bytes.
    pub(crate) fn handshake_write_io(&mut self) -> Result<(), TlsError> {
        let action = self.active_action()?;
        let record_type = action.record_type;

        // Wiped distinguishes the first call for this message from a
        // re-entry after a blocked flush.
        if self.handshake.io.is_wiped() {
            if record_type == ContentType::Handshake {
                self.handshake_write_header(action.message_type);
            }
            let handler = action.handlers[self.mode as usize]
                .ok_or(TlsError::InvalidHandshakeState)?;
            handler(self)?;
            if record_type == ContentType::Handshake {
                self.handshake_finish_header();
            }
        }

        while self.handshake.io.available() > 0 {
            let max_payload = self.max_write_payload_size();
            let n = self.handshake.io.available().min(max_payload);
            let chunk = self.handshake.io.take(n);

            self.record_write(record_type, &chunk);

            // Only handshake-typed bytes enter the transcript.
            if record_type == ContentType::Handshake {
                self.handshake.transcript.update(&chunk);
            }

            self.flush_output()?;
        }

        self.out_buf.wipe();
        self.handshake.io.wipe();

        self.advance_message()
    }

    /// Assemble one handshake message from the scratch buffer plus whatever
    /// the current record still holds.
    pub(crate) fn read_full_handshake_message(&mut self) -> Result<ReadResult, TlsError> {
        let current = self.handshake.io.available();
        if current < TLS_HANDSHAKE_HEADER_LENGTH {
            // The header itself may be fragmented; take what is there.
            let needed = TLS_HANDSHAKE_HEADER_LENGTH - current;
            if self.in_buf.available() < needed {
                let rest = self.in_buf.take(self.in_buf.available());
                self.handshake.io.write(&rest);
                return Ok(ReadResult::NeedMore);
            }
            let bytes = self.in_buf.take(needed);
            self.handshake.io.write(&bytes);
        }

        let header = self
            .handshake
            .io
            .read_bytes(TLS_HANDSHAKE_HEADER_LENGTH)
            .ok_or(TlsError::BadMessage)?;
        let message_type = header[0];
        let length = ((header[1] as usize) << 16) | ((header[2] as usize) << 8) | header[3] as usize;
        if length > MAX_HANDSHAKE_MESSAGE_LENGTH {
            return Err(TlsError::BadMessage);
        }

        let to_take = (length - self.handshake.io.available()).min(self.in_buf.available());
        let bytes = self.in_buf.take(to_take);
        self.handshake.io.write(&bytes);

        if self.handshake.io.available() == length {
            // The whole message, header included, enters the transcript
            // exactly once.
            let message = self.handshake.io.as_slice().to_vec();
            self.handshake.transcript.update(&message);
            return Ok(ReadResult::Done(message_type));
        }

        // Rewind so the next attempt re-parses the header with more data.
        self.handshake.io.reread();
        Ok(ReadResult::NeedMore)
    }

    /// Read-side driver: pull one record and dispatch on its content type.
    ///
    /// Record content types may interleave arbitrarily during a handshake:
    /// alerts are processed without advancing, unknown types are dropped,
    /// application data is refused, and handshake records may carry message
    /// fragments or several whole messages back to back.
    pub(crate) fn handshake_read_io(&mut self) -> Result<(), TlsError> {
        let (record_type, is_sslv2) = self.read_full_record()?;

        if is_sslv2 {
            // Only acceptable as the very first message of a handshake.
            if self.active_message()? != MessageType::ClientHello {
                return Err(TlsError::BadMessage);
            }

            // Transcript sees the three SSLv2 header bytes, then the body.
            let sslv2_header = self.header_in.as_slice()[2..5].to_vec();
            self.handshake.transcript.update(&sslv2_header);
            let body = self.in_buf.take(self.in_buf.available());
            self.handshake.transcript.update(&body);

            self.handshake.io.write(&body);
            let result = messages::sslv2_client_hello_recv(self);
            self.handshake.io.wipe();
            self.wipe_record_buffers();
            if let Err(err) = result {
                self.kill();
                return Err(err);
            }

            return self.advance_message();
        }

        match ContentType::from_byte(record_type) {
            Some(ContentType::ApplicationData) => {
                // Renegotiation is unsupported; application data cannot
                // appear mid-handshake.
                Err(TlsError::BadMessage)
            }
            Some(ContentType::ChangeCipherSpec) => {
                if self.in_buf.available() != 1 {
                    return Err(TlsError::BadMessage);
                }
                let byte = self.in_buf.take(1);
                self.handshake.io.write(&byte);

                let handler = self.active_action()?.handlers[self.mode as usize]
                    .ok_or(TlsError::InvalidHandshakeState)?;
                let result = handler(self);
                self.handshake.io.wipe();
                self.wipe_record_buffers();
                if let Err(err) = result {
                    self.kill();
                    return Err(err);
                }

                self.advance_message()
            }
            Some(ContentType::Alert) => {
                let result = self.process_alert_fragment();
                self.wipe_record_buffers();
                result
            }
            Some(ContentType::Handshake) => {
                while self.in_buf.available() > 0 {
                    match self.read_full_handshake_message()? {
                        ReadResult::NeedMore => {
                            // The caller will read another record; the
                            // partial message stays in the scratch buffer.
                            self.wipe_record_buffers();
                            return Ok(());
                        }
                        ReadResult::Done(message_type) => {
                            if message_type != self.active_action()?.message_type {
                                return Err(TlsError::BadMessage);
                            }

                            let handler = self.active_action()?.handlers[self.mode as usize]
                                .ok_or(TlsError::InvalidHandshakeState)?;
                            let result = handler(self);
                            self.handshake.io.wipe();
                            if let Err(err) = result {
                                self.kill();
                                return Err(err);
                            }

                            self.advance_message()?;
                        }
                    }
                }
                self.wipe_record_buffers();
                Ok(())
            }
            _ => {
                log::trace!("ignoring record of unknown content type {}", record_type);
                self.wipe_record_buffers();
                Ok(())
            }
        }
    }

    /// Drive the handshake as far as the transport allows.
    ///
    /// Returns [`Blocked::NotBlocked`] once the handshake is complete,
    /// [`Blocked::Read`]/[`Blocked::Write`] when the transport would block
    /// (call again after waiting on it), or an error for fatal failures.
    /// Fatal failures kill the connection and, when caching is enabled,
    /// evict the session from the cache.
    pub fn negotiate(&mut self) -> Result<Blocked, TlsError> {
        if self.killed {
            return Err(TlsError::ConnectionClosed);
        }

        let this = Writer::from_mode(self.mode);

        while self.active_action()?.writer != Writer::Both {
            // Drain pending output before making new progress.
            match self.flush_output() {
                Ok(()) => {}
                Err(TlsError::WouldBlock) => return Ok(Blocked::Write),
                Err(err) => {
                    self.kill();
                    return Err(err);
                }
            }

            if self.active_action()?.writer == this {
                match self.handshake_write_io() {
                    Ok(()) => {}
                    Err(TlsError::WouldBlock) => return Ok(Blocked::Write),
                    Err(err) => {
                        self.kill();
                        return Err(err);
                    }
                }
            } else {
                match self.handshake_read_io() {
                    Ok(()) => {}
                    Err(TlsError::WouldBlock) => return Ok(Blocked::Read),
                    Err(err) => {
                        if self.config.caching_enabled() && self.session_id_len > 0 {
                            if let Some(cache) = self.config.session_cache.as_ref() {
                                cache.delete(&self.session_id[..self.session_id_len]);
                            }
                        }
                        self.kill();
                        return Err(err);
                    }
                }
            }

            if self.active_action()?.writer == Writer::Both {
                // The handshake just ended: release the scratch buffer and
                // let a caching server remember the session.
                self.handshake.io.resize(0);
                self.finalize_session();
                log::debug!("handshake complete: {:?}", self.handshake.handshake_type);
            }
        }

        Ok(Blocked::NotBlocked)
    }

    fn finalize_session(&mut self) {
        if self.mode != Mode::Server || self.session_id_len == 0 || self.is_resumed() {
            return;
        }
        if let (Some(cache), Some(suite)) = (self.config.session_cache.as_ref(), self.cipher_suite)
        {
            cache.store(
                &self.session_id[..self.session_id_len],
                &session::encode_entry(suite),
            );
        }
    }
}
