//! TLS alert protocol handling.
//!
//! Alerts may arrive at any point during the handshake and may themselves be
//! split across records, down to one byte at a time. Fragments accumulate in
//! a two-byte staging buffer; nothing is acted on until both bytes are
//! present. Warnings are logged and ignored; close_notify and fatal alerts
//! make the connection unrecoverable.

use crate::connection::Connection;
use crate::TlsError;

/// Alert level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertLevel {
    /// Warning.
    Warning = 1,
    /// Fatal.
    Fatal = 2,
}

impl AlertLevel {
    /// Parse from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }
}

/// TLS alert description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    DecompressionFailure = 30,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    UserCanceled = 90,
    NoRenegotiation = 100,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    BadCertificateStatusResponse = 113,
}

impl AlertDescription {
    /// Parse from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AlertDescription::CloseNotify),
            10 => Some(AlertDescription::UnexpectedMessage),
            20 => Some(AlertDescription::BadRecordMac),
            22 => Some(AlertDescription::RecordOverflow),
            30 => Some(AlertDescription::DecompressionFailure),
            40 => Some(AlertDescription::HandshakeFailure),
            42 => Some(AlertDescription::BadCertificate),
            43 => Some(AlertDescription::UnsupportedCertificate),
            44 => Some(AlertDescription::CertificateRevoked),
            45 => Some(AlertDescription::CertificateExpired),
            46 => Some(AlertDescription::CertificateUnknown),
            47 => Some(AlertDescription::IllegalParameter),
            48 => Some(AlertDescription::UnknownCa),
            49 => Some(AlertDescription::AccessDenied),
            50 => Some(AlertDescription::DecodeError),
            51 => Some(AlertDescription::DecryptError),
            70 => Some(AlertDescription::ProtocolVersion),
            71 => Some(AlertDescription::InsufficientSecurity),
            80 => Some(AlertDescription::InternalError),
            90 => Some(AlertDescription::UserCanceled),
            100 => Some(AlertDescription::NoRenegotiation),
            110 => Some(AlertDescription::UnsupportedExtension),
            112 => Some(AlertDescription::UnrecognizedName),
            113 => Some(AlertDescription::BadCertificateStatusResponse),
            _ => None,
        }
    }
}

impl Connection {
    /// Consume an alert fragment from the current record.
    ///
    /// The two alert bytes may be split across records; partial bytes stay in
    /// `alert_in` until the pair completes.
    pub(crate) fn process_alert_fragment(&mut self) -> Result<(), TlsError> {
        while self.in_buf.available() > 0 && self.alert_in.len() < 2 {
            let byte = self.in_buf.take(1);
            self.alert_in.write(&byte);
        }

        if self.alert_in.len() < 2 {
            return Ok(());
        }

        let alert = self.alert_in.as_slice();
        let level = alert[0];
        let description = alert[1];
        self.alert_in.wipe();

        if level == AlertLevel::Fatal as u8
            || description == AlertDescription::CloseNotify as u8
        {
            log::debug!("fatal alert received: {}", description);
            self.kill();
            return Err(TlsError::AlertReceived(description));
        }

        log::debug!("warning alert ignored: {}", description);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pipe;
    use crate::{Connection, TlsConfig};

    fn server() -> Connection {
        let (_, server_end) = pipe();
        Connection::new_server(TlsConfig::default(), server_end)
    }

    #[test]
    fn test_alert_description() {
        assert_eq!(AlertDescription::from_byte(40), Some(AlertDescription::HandshakeFailure));
        assert_eq!(AlertDescription::from_byte(255), None);
        assert_eq!(AlertLevel::from_byte(2), Some(AlertLevel::Fatal));
    }

    #[test]
    fn test_warning_alert_ignored() {
        let mut conn = server();
        conn.in_buf.write(&[AlertLevel::Warning as u8, AlertDescription::UnrecognizedName as u8]);
        assert_eq!(conn.process_alert_fragment(), Ok(()));
        assert!(!conn.is_killed());
    }

    #[test]
    fn test_fatal_alert_kills_connection() {
        let mut conn = server();
        conn.in_buf.write(&[AlertLevel::Fatal as u8, AlertDescription::HandshakeFailure as u8]);
        assert_eq!(
            conn.process_alert_fragment(),
            Err(TlsError::AlertReceived(AlertDescription::HandshakeFailure as u8))
        );
        assert!(conn.is_killed());
    }

    #[test]
    fn test_fragmented_alert_accumulates() {
        let mut conn = server();
        conn.in_buf.write(&[AlertLevel::Fatal as u8]);
        assert_eq!(conn.process_alert_fragment(), Ok(()));
        assert!(!conn.is_killed());

        conn.in_buf.wipe();
        conn.in_buf.write(&[AlertDescription::CloseNotify as u8]);
        assert_eq!(
            conn.process_alert_fragment(),
            Err(TlsError::AlertReceived(AlertDescription::CloseNotify as u8))
        );
    }

    #[test]
    fn test_close_notify_is_terminal() {
        let mut conn = server();
        conn.in_buf.write(&[AlertLevel::Warning as u8, AlertDescription::CloseNotify as u8]);
        assert!(conn.process_alert_fragment().is_err());
        assert!(conn.is_killed());
    }
}
