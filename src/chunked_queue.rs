use crate::error::{Error, Result};
use std::collections::VecDeque;

/// FIFO queue: items are pushed one at a time and shifted out in chunks of `chunk_size`.
///
/// Invariant: `chunks` always holds at least one (possibly empty) chunk.
#[derive(Clone, Debug)]
pub struct ChunkedQueue<T> {
    chunk_size: usize,
    chunks: VecDeque<Vec<T>>,
}

impl<T> ChunkedQueue<T> {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be > 0".into()));
        }
        let mut chunks = VecDeque::with_capacity(2);
        chunks.push_back(Vec::with_capacity(chunk_size));
        Ok(Self { chunk_size, chunks })
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    /// Total queued items across all chunks.
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn push(&mut self, item: T) {
        match self.chunks.back_mut() {
            Some(last) if last.len() < self.chunk_size => last.push(item),
            _ => {
                let mut chunk = Vec::with_capacity(self.chunk_size);
                chunk.push(item);
                self.chunks.push_back(chunk);
            }
        }
    }

    /// The oldest chunk is at least 90% full: a hint that it is worth flushing.
    pub fn is_nearly_full(&self) -> bool {
        let front = self.chunks.front().map_or(0, Vec::len);
        front as f64 >= self.chunk_size as f64 * 0.9
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.front().map_or(true, Vec::is_empty)
    }

    /// Removes and returns the oldest chunk. Empty queue → empty `Vec`.
    pub fn pop_chunk(&mut self) -> Vec<T> {
        let first = self.chunks.pop_front().unwrap_or_default();
        if self.chunks.is_empty() {
            self.chunks.push_back(Vec::with_capacity(self.chunk_size));
        }
        first
    }
}

impl<T> Extend<T> for ChunkedQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}
