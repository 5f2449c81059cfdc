//! TLS connection state.
//!
//! A `Connection` owns everything with connection lifetime: the transport,
//! the record-layer staging buffers, and the handshake state (current shape
//! position, scratch message buffer, transcript hashes). It is driven by
//! repeated calls to [`Connection::negotiate`].

use rand::rngs::OsRng;
use rand::RngCore;

use crate::buffer::Buffer;
use crate::config::TlsConfig;
use crate::handshake::HandshakeState;
use crate::record::Transport;
use crate::session::TLS_SESSION_ID_MAX_LEN;
use crate::suites::CipherSuite;
use crate::{Mode, TlsError, TlsVersion};

/// One endpoint of a TLS connection.
pub struct Connection {
    pub(crate) mode: Mode,
    pub(crate) config: TlsConfig,
    pub(crate) transport: Box<dyn Transport>,

    /// Negotiated protocol version; also stamped on outbound records.
    pub(crate) version: TlsVersion,

    // Record layer staging.
    pub(crate) header_in: Buffer,
    pub(crate) in_buf: Buffer,
    pub(crate) out_buf: Buffer,
    pub(crate) alert_in: Buffer,
    pub(crate) first_record: bool,

    // Handshake state.
    pub(crate) handshake: HandshakeState,
    pub(crate) client_random: [u8; 32],
    pub(crate) server_random: [u8; 32],
    pub(crate) cipher_suite: Option<CipherSuite>,
    pub(crate) session_id: [u8; TLS_SESSION_ID_MAX_LEN],
    pub(crate) session_id_len: usize,
    /// Client side: the server echoed the session id we offered.
    pub(crate) pending_resume: bool,
    /// Server side: the client asked for a certificate status response.
    pub(crate) status_requested: bool,
    /// Client side: the server acknowledged our status request.
    pub(crate) status_expected: bool,

    pub(crate) peer_cert_chain: Vec<Vec<u8>>,
    pub(crate) peer_ocsp_response: Vec<u8>,
    pub(crate) local_key_share: Vec<u8>,
    pub(crate) peer_key_share: Vec<u8>,

    // I/O direction optimization.
    pub(crate) corked_io: bool,
    pub(crate) was_corked: bool,

    pub(crate) killed: bool,
}

impl Connection {
    /// Create the client side of a connection over `transport`.
    pub fn new_client<T: Transport + 'static>(config: TlsConfig, transport: T) -> Self {
        let mut conn = Self::new(Mode::Client, config, Box::new(transport));
        OsRng.fill_bytes(&mut conn.client_random);
        conn
    }

    /// Create the server side of a connection over `transport`.
    pub fn new_server<T: Transport + 'static>(config: TlsConfig, transport: T) -> Self {
        let mut conn = Self::new(Mode::Server, config, Box::new(transport));
        OsRng.fill_bytes(&mut conn.server_random);
        conn
    }

    fn new(mode: Mode, config: TlsConfig, transport: Box<dyn Transport>) -> Self {
        let corked_io = config.corked_io;
        let was_corked = transport.was_corked();
        Self {
            mode,
            config,
            transport,
            version: TlsVersion::Tls12,
            header_in: Buffer::new(),
            in_buf: Buffer::new(),
            out_buf: Buffer::new(),
            alert_in: Buffer::new(),
            first_record: true,
            handshake: HandshakeState::new(),
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            cipher_suite: None,
            session_id: [0u8; TLS_SESSION_ID_MAX_LEN],
            session_id_len: 0,
            pending_resume: false,
            status_requested: false,
            status_expected: false,
            peer_cert_chain: Vec::new(),
            peer_ocsp_response: Vec::new(),
            local_key_share: Vec::new(),
            peer_key_share: Vec::new(),
            corked_io,
            was_corked,
            killed: false,
        }
    }

    /// Endpoint role.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> TlsVersion {
        self.version
    }

    /// Negotiated cipher suite, once ServerHello has been processed.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    /// The current session identifier.
    pub fn session_id(&self) -> &[u8] {
        &self.session_id[..self.session_id_len]
    }

    /// Offer `id` for session resumption on the next handshake. Client only
    /// in effect; the server derives its ids from the cache.
    pub fn set_session_id(&mut self, id: &[u8]) -> Result<(), TlsError> {
        if id.len() > TLS_SESSION_ID_MAX_LEN {
            return Err(TlsError::InvalidSessionId);
        }
        self.session_id[..id.len()].copy_from_slice(id);
        self.session_id_len = id.len();
        Ok(())
    }

    /// Whether the completed handshake resumed a cached session.
    pub fn is_resumed(&self) -> bool {
        self.handshake
            .handshake_type
            .contains(crate::handshake::HandshakeType::RESUME)
    }

    /// The peer's certificate chain, leaf first, raw DER.
    pub fn peer_certificates(&self) -> &[Vec<u8>] {
        &self.peer_cert_chain
    }

    /// The OCSP response stapled by the server, if one was sent.
    pub fn peer_ocsp_response(&self) -> &[u8] {
        &self.peer_ocsp_response
    }

    /// Whether an earlier failure made the connection unrecoverable.
    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Mark the connection unrecoverable; all further driving fails.
    pub(crate) fn kill(&mut self) {
        self.killed = true;
    }
}
