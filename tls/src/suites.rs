//! TLS 1.0/1.1/1.2 cipher suites.

use bitflags::bitflags;

bitflags! {
    /// Key-exchange properties of a cipher suite.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyExchange: u8 {
        /// RSA key transport.
        const RSA = 0b001;
        /// Elliptic-curve Diffie-Hellman.
        const ECDH = 0b010;
        /// Ephemeral key-exchange keys; the handshake gains perfect forward
        /// secrecy and carries a ServerKeyExchange message.
        const EPHEMERAL = 0b100;
    }
}

/// TLS cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    /// TLS_RSA_WITH_AES_128_CBC_SHA.
    RsaAes128CbcSha,
    /// TLS_RSA_WITH_AES_256_CBC_SHA.
    RsaAes256CbcSha,
    /// TLS_RSA_WITH_AES_128_CBC_SHA256.
    RsaAes128CbcSha256,
    /// TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA.
    EcdheRsaAes128CbcSha,
    /// TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256.
    EcdheRsaAes128GcmSha256,
    /// TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384.
    EcdheRsaAes256GcmSha384,
}

impl CipherSuite {
    /// Get the cipher suite ID.
    pub fn to_id(&self) -> u16 {
        match self {
            CipherSuite::RsaAes128CbcSha => 0x002F,
            CipherSuite::RsaAes256CbcSha => 0x0035,
            CipherSuite::RsaAes128CbcSha256 => 0x003C,
            CipherSuite::EcdheRsaAes128CbcSha => 0xC013,
            CipherSuite::EcdheRsaAes128GcmSha256 => 0xC02F,
            CipherSuite::EcdheRsaAes256GcmSha384 => 0xC030,
        }
    }

    /// Parse from ID.
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0x002F => Some(CipherSuite::RsaAes128CbcSha),
            0x0035 => Some(CipherSuite::RsaAes256CbcSha),
            0x003C => Some(CipherSuite::RsaAes128CbcSha256),
            0xC013 => Some(CipherSuite::EcdheRsaAes128CbcSha),
            0xC02F => Some(CipherSuite::EcdheRsaAes128GcmSha256),
            0xC030 => Some(CipherSuite::EcdheRsaAes256GcmSha384),
            _ => None,
        }
    }

    /// Key-exchange classification.
    pub fn key_exchange(&self) -> KeyExchange {
        match self {
            CipherSuite::RsaAes128CbcSha
            | CipherSuite::RsaAes256CbcSha
            | CipherSuite::RsaAes128CbcSha256 => KeyExchange::RSA,
            CipherSuite::EcdheRsaAes128CbcSha
            | CipherSuite::EcdheRsaAes128GcmSha256
            | CipherSuite::EcdheRsaAes256GcmSha384 => {
                KeyExchange::ECDH.union(KeyExchange::EPHEMERAL)
            }
        }
    }

    /// Whether the suite's PRF runs over SHA-384 rather than SHA-256.
    pub fn prf_sha384(&self) -> bool {
        matches!(self, CipherSuite::EcdheRsaAes256GcmSha384)
    }

    /// Pick the first suite in `preference` that the peer offered.
    pub fn select(preference: &[CipherSuite], offered: &[u16]) -> Option<CipherSuite> {
        preference
            .iter()
            .copied()
            .find(|suite| offered.contains(&suite.to_id()))
    }
}
