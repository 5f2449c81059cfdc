//! Session caching and resumption.
//!
//! The cache itself is opaque to the handshake engine: the configuration
//! carries a [`SessionCache`] trait object and the engine only ever calls
//! `lookup`, `store` and `delete` through it. Implementations own their
//! synchronization; the engine holds no locks.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::connection::Connection;
use crate::suites::CipherSuite;
use crate::Mode;

/// Maximum TLS session identifier length.
pub const TLS_SESSION_ID_MAX_LEN: usize = 32;

/// External session store consulted for abbreviated handshakes.
pub trait SessionCache: Send + Sync {
    /// Fetch the stored entry for `session_id`, if any.
    fn lookup(&self, session_id: &[u8]) -> Option<Vec<u8>>;

    /// Store `entry` under `session_id`, replacing any previous value.
    fn store(&self, session_id: &[u8], entry: &[u8]);

    /// Drop `session_id` from the cache.
    fn delete(&self, session_id: &[u8]);
}

/// Serialize the negotiated parameters worth keeping across handshakes.
pub(crate) fn encode_entry(suite: CipherSuite) -> Vec<u8> {
    suite.to_id().to_be_bytes().to_vec()
}

/// Decode a cache entry back into a cipher suite.
fn decode_entry(entry: &[u8]) -> Option<CipherSuite> {
    if entry.len() != 2 {
        return None;
    }
    CipherSuite::from_id(u16::from_be_bytes([entry[0], entry[1]]))
}

/// Attempt to resume the connection from cached session state.
///
/// On the server this looks the client's offered session id up in the cache
/// and restores the cached parameters on a hit. On the client, resumption is
/// established when the server echoes the id the client offered.
pub(crate) fn resume_from_cache(conn: &mut Connection) -> bool {
    match conn.mode {
        Mode::Server => {
            if conn.session_id_len == 0 {
                return false;
            }
            let Some(cache) = conn.config.session_cache.as_ref() else {
                return false;
            };
            let Some(entry) = cache.lookup(&conn.session_id[..conn.session_id_len]) else {
                return false;
            };
            match decode_entry(&entry) {
                Some(suite) => {
                    conn.cipher_suite = Some(suite);
                    true
                }
                None => {
                    // Unreadable entry: fall back to a full handshake.
                    cache.delete(&conn.session_id[..conn.session_id_len]);
                    false
                }
            }
        }
        Mode::Client => conn.pending_resume,
    }
}

/// Generate a fresh server session id from public randomness.
pub(crate) fn generate_session_id(conn: &mut Connection) {
    OsRng.fill_bytes(&mut conn.session_id);
    conn.session_id_len = TLS_SESSION_ID_MAX_LEN;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{pipe, TestCache};
    use crate::{Connection, TlsConfig};
    use std::sync::Arc;

    fn server_with_cache(cache: Arc<TestCache>) -> Connection {
        let (_, server_end) = pipe();
        let config = TlsConfig::default().with_session_cache(cache);
        Connection::new_server(config, server_end)
    }

    #[test]
    fn test_entry_roundtrip() {
        let entry = encode_entry(CipherSuite::EcdheRsaAes128GcmSha256);
        assert_eq!(decode_entry(&entry), Some(CipherSuite::EcdheRsaAes128GcmSha256));
        assert_eq!(decode_entry(&[0xFF]), None);
        assert_eq!(decode_entry(&[0x13, 0x01]), None);
    }

    #[test]
    fn test_server_resume_hit() {
        let cache = Arc::new(TestCache::default());
        let id = [7u8; TLS_SESSION_ID_MAX_LEN];
        cache.store(&id, &encode_entry(CipherSuite::RsaAes128CbcSha));

        let mut conn = server_with_cache(cache);
        conn.session_id = id;
        conn.session_id_len = id.len();

        assert!(resume_from_cache(&mut conn));
        assert_eq!(conn.cipher_suite, Some(CipherSuite::RsaAes128CbcSha));
    }

    #[test]
    fn test_server_resume_miss() {
        let cache = Arc::new(TestCache::default());
        let mut conn = server_with_cache(cache);
        conn.session_id = [9u8; TLS_SESSION_ID_MAX_LEN];
        conn.session_id_len = TLS_SESSION_ID_MAX_LEN;
        assert!(!resume_from_cache(&mut conn));
    }

    #[test]
    fn test_corrupt_entry_deleted() {
        let cache = Arc::new(TestCache::default());
        let id = [3u8; TLS_SESSION_ID_MAX_LEN];
        cache.store(&id, &[0xDE, 0xAD, 0xBE]);

        let mut conn = server_with_cache(cache.clone());
        conn.session_id = id;
        conn.session_id_len = id.len();

        assert!(!resume_from_cache(&mut conn));
        assert_eq!(cache.delete_count(), 1);
    }

    #[test]
    fn test_generated_ids_differ() {
        let (_, end) = pipe();
        let mut conn = Connection::new_server(TlsConfig::default(), end);
        generate_session_id(&mut conn);
        let first = conn.session_id;
        assert_eq!(conn.session_id_len, TLS_SESSION_ID_MAX_LEN);
        generate_session_id(&mut conn);
        assert_ne!(first, conn.session_id);
    }
}
