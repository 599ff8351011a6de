//! LZ4-framed variant of the message stream: a connection-wide magic and
//! window size, followed by a sequence of `{decompressed_size,
//! compressed_size}`-prefixed frames (spec §4.1).

use crate::bytes::ByteBuffer;
use crate::error::DecodeError;

use super::LZ4_MAGIC;

/// Connection-header length: magic (4) + window size (4).
const CONN_HEADER_LEN: usize = 8;
/// Per-frame header: decompressed size (4) + compressed size (4).
const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitConnectionHeader,
    AwaitFrameHeader,
    AwaitFrameBody {
        decompressed_size: usize,
        compressed_size: usize,
    },
}

/// Strips the LZ4 connection/frame headers and decompresses each frame,
/// handing the caller a stream of plain IPFIX bytes.
pub struct Lz4Framer {
    state: State,
    raw: ByteBuffer,
    #[allow(dead_code)]
    window_size: u32,
}

impl Lz4Framer {
    pub fn new() -> Self {
        Self {
            state: State::AwaitConnectionHeader,
            raw: ByteBuffer::new(),
            window_size: 0,
        }
    }

    /// Appends newly read bytes and returns any plain bytes now decodable.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
        self.raw.extend_from_slice(bytes);
        let mut out = Vec::new();
        loop {
            match self.state {
                State::AwaitConnectionHeader => {
                    if self.raw.len() < CONN_HEADER_LEN {
                        return Ok(out);
                    }
                    let header = self.raw.as_slice();
                    let magic = u32::from_be_bytes(header[0..4].try_into().unwrap());
                    if magic != LZ4_MAGIC {
                        return Err(DecodeError::Lz4(format!(
                            "bad lz4 magic {magic:#010x}"
                        )));
                    }
                    self.window_size = u32::from_be_bytes(header[4..8].try_into().unwrap());
                    self.raw.drain_front(CONN_HEADER_LEN);
                    self.state = State::AwaitFrameHeader;
                }
                State::AwaitFrameHeader => {
                    if self.raw.len() < FRAME_HEADER_LEN {
                        return Ok(out);
                    }
                    let header = self.raw.as_slice();
                    let decompressed_size =
                        u32::from_be_bytes(header[0..4].try_into().unwrap()) as usize;
                    let compressed_size =
                        u32::from_be_bytes(header[4..8].try_into().unwrap()) as usize;
                    self.raw.drain_front(FRAME_HEADER_LEN);
                    self.state = State::AwaitFrameBody {
                        decompressed_size,
                        compressed_size,
                    };
                }
                State::AwaitFrameBody {
                    decompressed_size,
                    compressed_size,
                } => {
                    if self.raw.len() < compressed_size {
                        return Ok(out);
                    }
                    let compressed = &self.raw.as_slice()[..compressed_size];
                    let decompressed =
                        lz4_flex::block::decompress(compressed, decompressed_size)
                            .map_err(|e| DecodeError::Lz4(e.to_string()))?;
                    out.extend_from_slice(&decompressed);
                    self.raw.drain_front(compressed_size);
                    self.state = State::AwaitFrameHeader;
                }
            }
        }
    }
}

impl Default for Lz4Framer {
    fn default() -> Self {
        Self::new()
    }
}
