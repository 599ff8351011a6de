use std::collections::VecDeque;
use std::io;

use super::{ReadOutcome, StreamReader};

/// A `StreamReader` backed by an in-memory queue of chunks, for tests that
/// need to exercise partial reads and reassembly without a real socket.
#[derive(Default)]
pub struct MemoryReader {
    chunks: VecDeque<Vec<u8>>,
    ended: bool,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a chunk to be returned by the next `read()` call.
    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.chunks.push_back(chunk);
    }

    /// Marks the stream as closed once all queued chunks are drained.
    pub fn end(&mut self) {
        self.ended = true;
    }
}

impl StreamReader for MemoryReader {
    fn read(&mut self, buf: &mut Vec<u8>) -> io::Result<ReadOutcome> {
        match self.chunks.pop_front() {
            Some(chunk) => {
                let n = chunk.len();
                buf.extend_from_slice(&chunk);
                Ok(ReadOutcome::Read(n))
            }
            None if self.ended => Ok(ReadOutcome::End),
            None => Ok(ReadOutcome::WouldBlock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_queued_chunks_in_order() {
        let mut reader = MemoryReader::new();
        reader.push_chunk(vec![1, 2, 3]);
        reader.push_chunk(vec![4, 5]);

        let mut buf = Vec::new();
        matches!(reader.read(&mut buf).unwrap(), ReadOutcome::Read(3));
        matches!(reader.read(&mut buf).unwrap(), ReadOutcome::Read(2));
        assert_eq!(buf, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn reports_would_block_before_end() {
        let mut reader = MemoryReader::new();
        let mut buf = Vec::new();
        assert!(matches!(
            reader.read(&mut buf).unwrap(),
            ReadOutcome::WouldBlock
        ));
        reader.end();
        assert!(matches!(reader.read(&mut buf).unwrap(), ReadOutcome::End));
    }
}
