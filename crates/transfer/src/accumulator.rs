use bytes::{Bytes, BytesMut};

/// Byte accumulator that hands out fixed-size chunks.
///
/// Bytes go in with [`append`](Self::append) in arbitrary pieces and come out
/// in order, either as exact `n`-byte chunks or as whatever is left at the end.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    buf: BytesMut,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocates room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Takes exactly `n` bytes off the front, or `None` if fewer are buffered.
    pub fn next_chunk(&mut self, n: usize) -> Option<Bytes> {
        if n == 0 || self.buf.len() < n {
            return None;
        }
        Some(self.buf.split_to(n).freeze())
    }

    /// Takes every complete `n`-byte chunk, leaving fewer than `n` bytes behind.
    pub fn drain_chunks(&mut self, n: usize) -> Vec<Bytes> {
        let mut chunks = Vec::with_capacity(self.buf.len() / n.max(1));
        while let Some(chunk) = self.next_chunk(n) {
            chunks.push(chunk);
        }
        chunks
    }

    /// Takes everything that is left (possibly empty).
    pub fn drain_remainder(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}
