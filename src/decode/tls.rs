//! TLS-wrapped variant of the message stream. The handshake driver is
//! lazy: no bytes are sent or expected until the connection is
//! discriminated as TLS (content-type byte `0x16`, spec §4.1) and a
//! [`rustls::ServerConnection`] is attached.
//!
//! Certificate/key material loading is a boundary concern (spec §1
//! Non-goals: "does not implement TLS certificate management"); this
//! module only drives the already-configured connection's non-blocking
//! handshake and record decryption.

use std::io::{Cursor, Read};
use std::sync::Arc;

use rustls::ServerConnection;

use crate::error::DecodeError;

/// Drives a `rustls::ServerConnection`'s non-blocking handshake and strips
/// TLS record framing, handing the caller decrypted IPFIX bytes.
pub struct TlsFraming {
    conn: Option<ServerConnection>,
}

impl TlsFraming {
    pub fn new() -> Self {
        Self { conn: None }
    }

    /// Attaches a server connection built from the embedder's certificate
    /// configuration. Must be called before the first `ingest`.
    pub fn attach(&mut self, config: Arc<rustls::ServerConfig>) -> Result<(), DecodeError> {
        let conn = ServerConnection::new(config).map_err(|e| DecodeError::Tls(e.to_string()))?;
        self.conn = Some(conn);
        Ok(())
    }

    /// Feeds newly-read ciphertext, returning any plaintext IPFIX bytes
    /// that decrypted out of it this round.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DecodeError::Tls("tls connection not attached".to_string()))?;

        let mut cursor = Cursor::new(bytes);
        while cursor.position() < bytes.len() as u64 {
            conn.read_tls(&mut cursor)
                .map_err(|e| DecodeError::Tls(e.to_string()))?;
        }
        conn.process_new_packets()
            .map_err(|e| DecodeError::Tls(e.to_string()))?;

        let mut plaintext = Vec::new();
        match conn.reader().read_to_end(&mut plaintext) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(DecodeError::Tls(e.to_string())),
        }
        Ok(plaintext)
    }
}

impl Default for TlsFraming {
    fn default() -> Self {
        Self::new()
    }
}
