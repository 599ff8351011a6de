//! Abstraction over "the acceptor already decided this connection is
//! readable" (spec §1, §5). This crate never drives an event loop itself;
//! an embedding binary owns the `epoll`/acceptor machinery and calls
//! [`StreamReader::read`] once it knows bytes are available.

use std::io::{self, Read};

mod memory;

pub use memory::MemoryReader;

/// Outcome of a single non-blocking read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// Bytes were read and appended to the caller's buffer.
    Read(usize),
    /// No data was available right now; try again once the acceptor signals
    /// readability again.
    WouldBlock,
    /// The peer closed the connection.
    End,
}

/// A source of bytes for [`crate::decode::MessageDecoder`].
///
/// Implementors must never block; a `WouldBlock` result tells the caller to
/// wait for the next readiness notification rather than spin.
pub trait StreamReader {
    /// Reads as many bytes as are immediately available into `buf`,
    /// returning how many were read.
    fn read(&mut self, buf: &mut Vec<u8>) -> io::Result<ReadOutcome>;
}

/// Wraps any blocking [`std::io::Read`] (e.g. a `TcpStream` already put in
/// non-blocking mode by the acceptor) as a [`StreamReader`].
pub struct PlainReader<R> {
    inner: R,
    scratch: [u8; 64 * 1024],
}

impl<R: Read> PlainReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            scratch: [0u8; 64 * 1024],
        }
    }
}

impl<R: Read> StreamReader for PlainReader<R> {
    fn read(&mut self, buf: &mut Vec<u8>) -> io::Result<ReadOutcome> {
        match self.inner.read(&mut self.scratch) {
            Ok(0) => Ok(ReadOutcome::End),
            Ok(n) => {
                buf.extend_from_slice(&self.scratch[..n]);
                Ok(ReadOutcome::Read(n))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
            Err(e) => Err(e),
        }
    }
}
