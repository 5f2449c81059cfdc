//! Connection configuration.

use std::sync::Arc;

use crate::session::SessionCache;
use crate::suites::CipherSuite;
use crate::TlsVersion;

/// TLS connection configuration.
///
/// A config may be shared across many connections; each connection keeps its
/// own clone, and the session cache handle inside it is reference counted.
#[derive(Clone)]
pub struct TlsConfig {
    /// Minimum TLS version to accept.
    pub min_version: TlsVersion,
    /// Allowed cipher suites (in order of preference).
    pub cipher_suites: Vec<CipherSuite>,
    /// Server name for SNI.
    pub server_name: Option<String>,
    /// Certificate chain presented by the server, leaf first, DER encoded.
    pub certificate_chain: Vec<Vec<u8>>,
    /// Stapled OCSP response the server may send in CertificateStatus.
    pub ocsp_response: Vec<u8>,
    /// Whether a client asks the server for a certificate status response.
    pub request_ocsp: bool,
    /// Session store for abbreviated handshakes. Caching is enabled iff set.
    pub session_cache: Option<Arc<dyn SessionCache>>,
    /// Coalesce same-direction handshake writes with cork/uncork.
    pub corked_io: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: TlsVersion::Tls10,
            cipher_suites: vec![
                CipherSuite::EcdheRsaAes256GcmSha384,
                CipherSuite::EcdheRsaAes128GcmSha256,
                CipherSuite::EcdheRsaAes128CbcSha,
                CipherSuite::RsaAes128CbcSha256,
                CipherSuite::RsaAes256CbcSha,
                CipherSuite::RsaAes128CbcSha,
            ],
            server_name: None,
            certificate_chain: Vec::new(),
            ocsp_response: Vec::new(),
            request_ocsp: false,
            session_cache: None,
            corked_io: false,
        }
    }
}

impl TlsConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cipher suite preference list.
    pub fn with_cipher_suites(mut self, suites: Vec<CipherSuite>) -> Self {
        self.cipher_suites = suites;
        self
    }

    /// Set the server name for SNI.
    pub fn with_server_name(mut self, name: &str) -> Self {
        self.server_name = Some(name.to_string());
        self
    }

    /// Set the certificate chain, leaf first.
    pub fn with_certificate_chain(mut self, chain: Vec<Vec<u8>>) -> Self {
        self.certificate_chain = chain;
        self
    }

    /// Set the stapled OCSP response.
    pub fn with_ocsp_response(mut self, response: Vec<u8>) -> Self {
        self.ocsp_response = response;
        self
    }

    /// Request a certificate status response from the server.
    pub fn with_ocsp_request(mut self) -> Self {
        self.request_ocsp = true;
        self
    }

    /// Enable session caching backed by `cache`.
    pub fn with_session_cache(mut self, cache: Arc<dyn SessionCache>) -> Self {
        self.session_cache = Some(cache);
        self
    }

    /// Enable cork/uncork write coalescing.
    pub fn with_corked_io(mut self) -> Self {
        self.corked_io = true;
        self
    }

    /// Whether session caching is enabled.
    pub fn caching_enabled(&self) -> bool {
        self.session_cache.is_some()
    }
}
