//! Reassembles length-framed IPFIX messages out of a byte stream that may be
//! plain, LZ4-framed, or wrapped in TLS (spec §4.1).
//!
//! The decoder variant is selected once, at connection start, by reading a
//! four-byte magic prefix — never re-sniffed per message (spec §9 redesign
//! note). Downstream of this module everything is plain IPFIX bytes; the
//! framing is fully absorbed here.

pub mod lz4;
mod tls;

use crate::bytes::ByteBuffer;
use crate::error::DecodeError;

pub use tls::TlsFraming;

/// IPFIX message header length: version, length, export time, sequence
/// number, observation domain ID (RFC 7011 §3.1).
const IPFIX_HEADER_LEN: usize = 16;

/// LZ4 framing magic, read once at connection start.
pub const LZ4_MAGIC: u32 = 0x4C5A_3463;

/// TLS content-type byte for a handshake record, used only to discriminate
/// a TLS-wrapped connection from a plain one at connection start.
const TLS_HANDSHAKE_CONTENT_TYPE: u8 = 0x16;

/// Which framing a connection uses. Chosen once and then fixed for the
/// lifetime of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Plain,
    Lz4,
    Tls,
}

impl Framing {
    /// Inspects the first bytes of a freshly accepted connection and picks
    /// the framing to use for its whole lifetime.
    pub fn detect(first_bytes: &[u8]) -> Option<Self> {
        if first_bytes.len() >= 4 {
            let magic = u32::from_be_bytes(first_bytes[..4].try_into().ok()?);
            if magic == LZ4_MAGIC {
                return Some(Framing::Lz4);
            }
        }
        if let Some(&b0) = first_bytes.first() {
            if b0 == TLS_HANDSHAKE_CONTENT_TYPE {
                return Some(Framing::Tls);
            }
            // A byte of 10 is the IPFIX version field's high byte (0x00);
            // the low byte (0x0A) appears second. Either way a plain IPFIX
            // header's first byte is always 0x00.
            if b0 == 0x00 {
                return Some(Framing::Plain);
            }
        }
        None
    }
}

/// Reassembly state. `AwaitBody` carries the declared total message length
/// (header included) read out of the IPFIX header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitHeader,
    AwaitBody { total_len: usize },
}

/// Reconstructs complete IPFIX messages from a possibly-fragmented,
/// possibly-compressed, possibly-TLS-wrapped byte stream.
pub struct MessageDecoder {
    framing: Framing,
    state: State,
    plain: ByteBuffer,
    max_message_len: usize,
    lz4: lz4::Lz4Framer,
    tls: tls::TlsFraming,
}

impl MessageDecoder {
    pub fn new(framing: Framing, max_message_len: usize) -> Self {
        Self {
            framing,
            state: State::AwaitHeader,
            plain: ByteBuffer::new(),
            max_message_len,
            lz4: lz4::Lz4Framer::new(),
            tls: tls::TlsFraming::new(),
        }
    }

    /// Feeds newly-read bytes into the decoder. Any LZ4/TLS unwrapping
    /// happens here; `plain` always holds decrypted/decompressed IPFIX
    /// bytes afterwards.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), DecodeError> {
        match self.framing {
            Framing::Plain => {
                self.plain.extend_from_slice(bytes);
                Ok(())
            }
            Framing::Lz4 => {
                let decompressed = self.lz4.ingest(bytes)?;
                self.plain.extend_from_slice(&decompressed);
                Ok(())
            }
            Framing::Tls => {
                let decrypted = self.tls.ingest(bytes)?;
                self.plain.extend_from_slice(&decrypted);
                Ok(())
            }
        }
    }

    /// Pulls the next complete message out of the decoder's internal
    /// buffer, if one has fully arrived. Call repeatedly until it returns
    /// `Ok(None)` after each `feed`.
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        loop {
            match self.state {
                State::AwaitHeader => {
                    if self.plain.len() < IPFIX_HEADER_LEN {
                        return Ok(None);
                    }
                    let header = self.plain.as_slice();
                    let total_len =
                        u16::from_be_bytes([header[2], header[3]]) as usize;
                    if total_len < IPFIX_HEADER_LEN {
                        return Err(DecodeError::LengthTooShort { length: total_len });
                    }
                    if total_len > self.max_message_len {
                        return Err(DecodeError::LengthTooLarge {
                            length: total_len,
                            max: self.max_message_len,
                        });
                    }
                    self.state = State::AwaitBody {
                        total_len,
                    };
                }
                State::AwaitBody { total_len } => {
                    if self.plain.len() < total_len {
                        return Ok(None);
                    }
                    let message = self.plain.as_slice()[..total_len].to_vec();
                    self.plain.drain_front(total_len);
                    self.state = State::AwaitHeader;
                    return Ok(Some(message));
                }
            }
        }
    }
}
