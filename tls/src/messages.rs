//! Handshake message handlers.
//!
//! One send/recv pair per handshake message. Send handlers append the message
//! payload to the handshake scratch buffer (the framer owns the 4-byte
//! header); recv handlers consume a complete message from the same buffer.
//! Key-exchange and certificate contents are carried opaquely: parameter
//! validation and secret derivation belong to the cryptographic layer.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::connection::Connection;
use crate::session::TLS_SESSION_ID_MAX_LEN;
use crate::suites::CipherSuite;
use crate::{TlsError, TlsVersion};

/// server_name extension type.
const EXT_SERVER_NAME: u16 = 0;
/// status_request extension type.
const EXT_STATUS_REQUEST: u16 = 5;

/// OCSP status type inside status_request / CertificateStatus.
const OCSP_STATUS_TYPE: u8 = 1;

const CLIENT_FINISHED_LABEL: &[u8] = b"client finished";
const SERVER_FINISHED_LABEL: &[u8] = b"server finished";

/// Length of the verify_data field in a Finished message.
pub(crate) const FINISHED_VERIFY_LEN: usize = 12;

// -- ClientHello -------------------------------------------------------------

pub(crate) fn client_hello_send(conn: &mut Connection) -> Result<(), TlsError> {
    let version = conn.version.to_bytes();
    conn.handshake.io.write(&version);

    let random = conn.client_random;
    conn.handshake.io.write(&random);

    let sid = conn.session_id[..conn.session_id_len].to_vec();
    conn.handshake.io.write_u8(sid.len() as u8);
    conn.handshake.io.write(&sid);

    let suite_ids: Vec<u8> = conn
        .config
        .cipher_suites
        .iter()
        .flat_map(|suite| suite.to_id().to_be_bytes())
        .collect();
    conn.handshake.io.write_u16(suite_ids.len() as u16);
    conn.handshake.io.write(&suite_ids);

    // Null compression only.
    conn.handshake.io.write_u8(1);
    conn.handshake.io.write_u8(0);

    let extensions = build_client_extensions(conn);
    conn.handshake.io.write_u16(extensions.len() as u16);
    conn.handshake.io.write(&extensions);

    Ok(())
}

fn build_client_extensions(conn: &Connection) -> Vec<u8> {
    let mut extensions = Vec::new();

    if let Some(name) = &conn.config.server_name {
        extensions.extend_from_slice(&EXT_SERVER_NAME.to_be_bytes());
        extensions.extend_from_slice(&((name.len() + 5) as u16).to_be_bytes());
        extensions.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
        extensions.push(0); // host_name
        extensions.extend_from_slice(&(name.len() as u16).to_be_bytes());
        extensions.extend_from_slice(name.as_bytes());
    }

    if conn.config.request_ocsp {
        extensions.extend_from_slice(&EXT_STATUS_REQUEST.to_be_bytes());
        extensions.extend_from_slice(&5u16.to_be_bytes());
        extensions.push(OCSP_STATUS_TYPE);
        extensions.extend_from_slice(&0u16.to_be_bytes()); // responder id list
        extensions.extend_from_slice(&0u16.to_be_bytes()); // request extensions
    }

    extensions
}

pub(crate) fn client_hello_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let version_bytes = conn.handshake.io.read_bytes(2).ok_or(TlsError::BadMessage)?;
    let client_version = TlsVersion::from_bytes([version_bytes[0], version_bytes[1]])
        .ok_or(TlsError::UnsupportedVersion)?;
    if client_version < conn.config.min_version {
        return Err(TlsError::UnsupportedVersion);
    }
    conn.version = client_version;

    let random = conn.handshake.io.read_bytes(32).ok_or(TlsError::BadMessage)?;
    conn.client_random.copy_from_slice(&random);

    let sid_len = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)? as usize;
    if sid_len > TLS_SESSION_ID_MAX_LEN {
        return Err(TlsError::BadMessage);
    }
    let sid = conn.handshake.io.read_bytes(sid_len).ok_or(TlsError::BadMessage)?;
    conn.session_id[..sid_len].copy_from_slice(&sid);
    conn.session_id_len = sid_len;

    let suites_len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
    if suites_len % 2 != 0 {
        return Err(TlsError::BadMessage);
    }
    let suite_bytes = conn
        .handshake
        .io
        .read_bytes(suites_len)
        .ok_or(TlsError::BadMessage)?;
    let offered: Vec<u16> = suite_bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let suite = CipherSuite::select(&conn.config.cipher_suites, &offered)
        .ok_or(TlsError::UnsupportedCipherSuite)?;
    conn.cipher_suite = Some(suite);

    let comp_len = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)? as usize;
    let compressions = conn
        .handshake
        .io
        .read_bytes(comp_len)
        .ok_or(TlsError::BadMessage)?;
    if !compressions.contains(&0) {
        return Err(TlsError::BadMessage);
    }

    if conn.handshake.io.available() >= 2 {
        let ext_len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
        let ext_data = conn
            .handshake
            .io
            .read_bytes(ext_len)
            .ok_or(TlsError::BadMessage)?;
        for (ext_type, _data) in parse_extensions(&ext_data)? {
            if ext_type == EXT_STATUS_REQUEST {
                conn.status_requested = true;
            }
        }
    }

    log::debug!(
        "client hello: version {:?}, suite {:?}, session id {} bytes",
        conn.version,
        suite,
        sid_len
    );
    Ok(())
}

/// SSLv2-format ClientHello, accepted on the first record only. The message
/// type and version bytes live in the record header buffer; the body starts
/// at the cipher-spec length.
pub(crate) fn sslv2_client_hello_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let header = conn.header_in.as_slice();
    let client_version =
        TlsVersion::from_bytes([header[3], header[4]]).ok_or(TlsError::UnsupportedVersion)?;
    if client_version < conn.config.min_version {
        return Err(TlsError::UnsupportedVersion);
    }
    conn.version = client_version;

    let specs_len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
    let sid_len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
    let challenge_len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
    if specs_len % 3 != 0 || sid_len > TLS_SESSION_ID_MAX_LEN {
        return Err(TlsError::BadMessage);
    }

    let specs = conn
        .handshake
        .io
        .read_bytes(specs_len)
        .ok_or(TlsError::BadMessage)?;
    // SSLv2 cipher specs are three bytes; TLS suites are the zero-prefixed ones.
    let offered: Vec<u16> = specs
        .chunks_exact(3)
        .filter(|spec| spec[0] == 0)
        .map(|spec| u16::from_be_bytes([spec[1], spec[2]]))
        .collect();
    let suite = CipherSuite::select(&conn.config.cipher_suites, &offered)
        .ok_or(TlsError::UnsupportedCipherSuite)?;
    conn.cipher_suite = Some(suite);

    let sid = conn.handshake.io.read_bytes(sid_len).ok_or(TlsError::BadMessage)?;
    conn.session_id[..sid_len].copy_from_slice(&sid);
    conn.session_id_len = sid_len;

    let challenge = conn
        .handshake
        .io
        .read_bytes(challenge_len)
        .ok_or(TlsError::BadMessage)?;
    // The challenge is right-aligned in the 32-byte client random.
    conn.client_random = [0u8; 32];
    let n = challenge.len().min(32);
    conn.client_random[32 - n..].copy_from_slice(&challenge[challenge.len() - n..]);

    log::debug!("SSLv2-format client hello: suite {:?}", suite);
    Ok(())
}

// -- ServerHello -------------------------------------------------------------

pub(crate) fn server_hello_send(conn: &mut Connection) -> Result<(), TlsError> {
    // Cipher suite and resumption are settled; pick the handshake shape
    // before a byte of ServerHello is produced.
    conn.set_handshake_type()?;

    let version = conn.version.to_bytes();
    conn.handshake.io.write(&version);

    let random = conn.server_random;
    conn.handshake.io.write(&random);

    // Only a caching server echoes a session id; an echo of the offered id
    // is what signals resumption to the client.
    let sid = if conn.config.caching_enabled() {
        conn.session_id[..conn.session_id_len].to_vec()
    } else {
        Vec::new()
    };
    conn.handshake.io.write_u8(sid.len() as u8);
    conn.handshake.io.write(&sid);

    let suite = conn.cipher_suite.ok_or(TlsError::InvalidHandshakeState)?;
    conn.handshake.io.write_u16(suite.to_id());
    conn.handshake.io.write_u8(0); // null compression

    let mut extensions = Vec::new();
    if conn
        .handshake
        .handshake_type
        .contains(crate::handshake::HandshakeType::OCSP_STATUS)
    {
        // Empty status_request acknowledgement: CertificateStatus will follow.
        extensions.extend_from_slice(&EXT_STATUS_REQUEST.to_be_bytes());
        extensions.extend_from_slice(&0u16.to_be_bytes());
    }
    conn.handshake.io.write_u16(extensions.len() as u16);
    conn.handshake.io.write(&extensions);

    Ok(())
}

pub(crate) fn server_hello_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let version_bytes = conn.handshake.io.read_bytes(2).ok_or(TlsError::BadMessage)?;
    let server_version = TlsVersion::from_bytes([version_bytes[0], version_bytes[1]])
        .ok_or(TlsError::UnsupportedVersion)?;
    if server_version < conn.config.min_version {
        return Err(TlsError::UnsupportedVersion);
    }
    conn.version = server_version;

    let random = conn.handshake.io.read_bytes(32).ok_or(TlsError::BadMessage)?;
    conn.server_random.copy_from_slice(&random);

    let sid_len = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)? as usize;
    if sid_len > TLS_SESSION_ID_MAX_LEN {
        return Err(TlsError::BadMessage);
    }
    let echoed = conn.handshake.io.read_bytes(sid_len).ok_or(TlsError::BadMessage)?;

    let suite_id = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)?;
    let suite = CipherSuite::from_id(suite_id).ok_or(TlsError::UnsupportedCipherSuite)?;
    if !conn.config.cipher_suites.contains(&suite) {
        return Err(TlsError::UnsupportedCipherSuite);
    }
    conn.cipher_suite = Some(suite);

    let compression = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)?;
    if compression != 0 {
        return Err(TlsError::BadMessage);
    }

    if conn.handshake.io.available() >= 2 {
        let ext_len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
        let ext_data = conn
            .handshake
            .io
            .read_bytes(ext_len)
            .ok_or(TlsError::BadMessage)?;
        for (ext_type, _data) in parse_extensions(&ext_data)? {
            if ext_type == EXT_STATUS_REQUEST {
                conn.status_expected = true;
            }
        }
    }

    // An echo of the id we offered means the server took the resume branch.
    conn.pending_resume = conn.session_id_len > 0
        && sid_len == conn.session_id_len
        && echoed == conn.session_id[..conn.session_id_len];
    if !conn.pending_resume {
        conn.session_id[..sid_len].copy_from_slice(&echoed);
        conn.session_id_len = sid_len;
    }

    conn.set_handshake_type()?;

    log::debug!(
        "server hello: version {:?}, suite {:?}, resume {}",
        conn.version,
        suite,
        conn.pending_resume
    );
    Ok(())
}

// -- Certificate / CertificateStatus ----------------------------------------

pub(crate) fn server_cert_send(conn: &mut Connection) -> Result<(), TlsError> {
    let total: usize = conn
        .config
        .certificate_chain
        .iter()
        .map(|cert| cert.len() + 3)
        .sum();
    conn.handshake.io.write_u24(total as u32);
    let chain = conn.config.certificate_chain.clone();
    for cert in &chain {
        conn.handshake.io.write_u24(cert.len() as u32);
        conn.handshake.io.write(cert);
    }
    Ok(())
}

pub(crate) fn server_cert_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let total = conn.handshake.io.read_u24().ok_or(TlsError::BadMessage)? as usize;
    let data = conn.handshake.io.read_bytes(total).ok_or(TlsError::BadMessage)?;

    let mut chain = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        if offset + 3 > data.len() {
            return Err(TlsError::BadMessage);
        }
        let len = ((data[offset] as usize) << 16)
            | ((data[offset + 1] as usize) << 8)
            | data[offset + 2] as usize;
        offset += 3;
        if offset + len > data.len() {
            return Err(TlsError::BadMessage);
        }
        chain.push(data[offset..offset + len].to_vec());
        offset += len;
    }
    conn.peer_cert_chain = chain;
    Ok(())
}

pub(crate) fn server_status_send(conn: &mut Connection) -> Result<(), TlsError> {
    conn.handshake.io.write_u8(OCSP_STATUS_TYPE);
    let response = conn.config.ocsp_response.clone();
    conn.handshake.io.write_u24(response.len() as u32);
    conn.handshake.io.write(&response);
    Ok(())
}

pub(crate) fn server_status_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let status_type = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)?;
    if status_type != OCSP_STATUS_TYPE {
        return Err(TlsError::BadMessage);
    }
    let len = conn.handshake.io.read_u24().ok_or(TlsError::BadMessage)? as usize;
    conn.peer_ocsp_response = conn.handshake.io.read_bytes(len).ok_or(TlsError::BadMessage)?;
    Ok(())
}

// -- Key exchange ------------------------------------------------------------

pub(crate) fn server_key_send(conn: &mut Connection) -> Result<(), TlsError> {
    let mut share = vec![0u8; 32];
    OsRng.fill_bytes(&mut share);
    conn.local_key_share = share.clone();

    conn.handshake.io.write_u8(3); // curve_type: named_curve
    conn.handshake.io.write_u16(0x001D); // x25519
    conn.handshake.io.write_u8(share.len() as u8);
    conn.handshake.io.write(&share);
    Ok(())
}

pub(crate) fn server_key_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let curve_type = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)?;
    if curve_type != 3 {
        return Err(TlsError::BadMessage);
    }
    let _curve = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)?;
    let len = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)? as usize;
    conn.peer_key_share = conn.handshake.io.read_bytes(len).ok_or(TlsError::BadMessage)?;
    Ok(())
}

pub(crate) fn client_key_send(conn: &mut Connection) -> Result<(), TlsError> {
    let mut share = vec![0u8; 32];
    OsRng.fill_bytes(&mut share);
    conn.local_key_share = share.clone();

    conn.handshake.io.write_u16(share.len() as u16);
    conn.handshake.io.write(&share);
    Ok(())
}

pub(crate) fn client_key_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let len = conn.handshake.io.read_u16().ok_or(TlsError::BadMessage)? as usize;
    conn.peer_key_share = conn.handshake.io.read_bytes(len).ok_or(TlsError::BadMessage)?;
    Ok(())
}

// -- ServerHelloDone ---------------------------------------------------------

pub(crate) fn server_done_send(_conn: &mut Connection) -> Result<(), TlsError> {
    // Empty payload.
    Ok(())
}

pub(crate) fn server_done_recv(conn: &mut Connection) -> Result<(), TlsError> {
    if conn.handshake.io.available() != 0 {
        return Err(TlsError::BadMessage);
    }
    Ok(())
}

// -- ChangeCipherSpec --------------------------------------------------------

/// Both peers pin the expected Finished verify data at the CCS boundary,
/// before the Finished message itself enters the transcript.
fn compute_finished_verify(conn: &Connection, label: &[u8]) -> [u8; FINISHED_VERIFY_LEN] {
    let snapshot: Vec<u8> = match conn.cipher_suite {
        Some(suite) if suite.prf_sha384() => conn.handshake.transcript.sha384_current().to_vec(),
        _ => conn.handshake.transcript.sha256_current().to_vec(),
    };
    let mut digest = Sha256::new();
    digest.update(label);
    digest.update(&snapshot);
    let full: [u8; 32] = digest.finalize().into();
    let mut verify = [0u8; FINISHED_VERIFY_LEN];
    verify.copy_from_slice(&full[..FINISHED_VERIFY_LEN]);
    verify
}

pub(crate) fn client_ccs_send(conn: &mut Connection) -> Result<(), TlsError> {
    let verify = compute_finished_verify(conn, CLIENT_FINISHED_LABEL);
    conn.handshake.client_verify = verify;
    conn.handshake.io.write_u8(0x01);
    Ok(())
}

pub(crate) fn client_ccs_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let byte = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)?;
    if byte != 0x01 {
        return Err(TlsError::BadMessage);
    }
    let verify = compute_finished_verify(conn, CLIENT_FINISHED_LABEL);
    conn.handshake.client_verify = verify;
    Ok(())
}

pub(crate) fn server_ccs_send(conn: &mut Connection) -> Result<(), TlsError> {
    let verify = compute_finished_verify(conn, SERVER_FINISHED_LABEL);
    conn.handshake.server_verify = verify;
    conn.handshake.io.write_u8(0x01);
    Ok(())
}

pub(crate) fn server_ccs_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let byte = conn.handshake.io.read_u8().ok_or(TlsError::BadMessage)?;
    if byte != 0x01 {
        return Err(TlsError::BadMessage);
    }
    let verify = compute_finished_verify(conn, SERVER_FINISHED_LABEL);
    conn.handshake.server_verify = verify;
    Ok(())
}

// -- Finished ----------------------------------------------------------------

pub(crate) fn client_finished_send(conn: &mut Connection) -> Result<(), TlsError> {
    let verify = conn.handshake.client_verify;
    conn.handshake.io.write(&verify);
    Ok(())
}

pub(crate) fn client_finished_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let verify = conn
        .handshake
        .io
        .read_bytes(FINISHED_VERIFY_LEN)
        .ok_or(TlsError::BadMessage)?;
    if conn.handshake.io.available() != 0 {
        return Err(TlsError::BadMessage);
    }
    if verify != conn.handshake.client_verify {
        return Err(TlsError::BadFinished);
    }
    Ok(())
}

pub(crate) fn server_finished_send(conn: &mut Connection) -> Result<(), TlsError> {
    let verify = conn.handshake.server_verify;
    conn.handshake.io.write(&verify);
    Ok(())
}

pub(crate) fn server_finished_recv(conn: &mut Connection) -> Result<(), TlsError> {
    let verify = conn
        .handshake
        .io
        .read_bytes(FINISHED_VERIFY_LEN)
        .ok_or(TlsError::BadMessage)?;
    if conn.handshake.io.available() != 0 {
        return Err(TlsError::BadMessage);
    }
    if verify != conn.handshake.server_verify {
        return Err(TlsError::BadFinished);
    }
    Ok(())
}

// -- Extension parsing -------------------------------------------------------

/// Parse an extensions block into (type, data) pairs.
fn parse_extensions(data: &[u8]) -> Result<Vec<(u16, Vec<u8>)>, TlsError> {
    let mut extensions = Vec::new();
    let mut offset = 0;

    while offset + 4 <= data.len() {
        let ext_type = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let ext_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        offset += 4;

        if offset + ext_len > data.len() {
            return Err(TlsError::BadMessage);
        }
        extensions.push((ext_type, data[offset..offset + ext_len].to_vec()));
        offset += ext_len;
    }

    if offset != data.len() {
        return Err(TlsError::BadMessage);
    }
    Ok(extensions)
}
