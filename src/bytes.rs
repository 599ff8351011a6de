//! Owned, resizable byte buffer used to accumulate a partial message across
//! multiple reads from a [`crate::stream::StreamReader`].
//!
//! Grounded on the original collector's `ByteVector`, a hand-rolled C buffer
//! with the same `resize`/`reserve`/`take`/`clear` surface. `Vec<u8>` already
//! gives Rust the ownership semantics that class hand-rolls, so this wraps
//! one rather than re-implementing raw allocation.

/// A growable byte buffer that tracks how much of its capacity is
/// logically "filled" data versus spare room for the next read.
#[derive(Debug, Default, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of filled bytes currently held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Ensures at least `additional` spare bytes are available without a
    /// further reallocation.
    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    /// Appends bytes read from the stream.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Drops `n` bytes from the front, shifting the remainder down. Used
    /// once a complete message has been consumed out of the buffer.
    pub fn drain_front(&mut self, n: usize) {
        self.data.drain(..n.min(self.data.len()));
    }

    /// Resets the buffer to empty without releasing its allocation, mirroring
    /// the original `ByteVector::clear()`.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Takes ownership of the filled bytes, leaving this buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_extends() {
        let mut buf = ByteBuffer::new();
        buf.extend_from_slice(&[1, 2, 3]);
        buf.extend_from_slice(&[4, 5]);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn drain_front_shifts_remainder() {
        let mut buf = ByteBuffer::new();
        buf.extend_from_slice(&[1, 2, 3, 4, 5]);
        buf.drain_front(2);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut buf = ByteBuffer::with_capacity(64);
        buf.extend_from_slice(&[1, 2, 3]);
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 64);
    }

    #[test]
    fn take_leaves_buffer_empty() {
        let mut buf = ByteBuffer::new();
        buf.extend_from_slice(&[9, 9]);
        let taken = buf.take();
        assert_eq!(taken, vec![9, 9]);
        assert!(buf.is_empty());
    }
}
