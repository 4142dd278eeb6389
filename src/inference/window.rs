use ndarray::{s, Array2};
use thiserror::Error;

use super::manifest::UtteranceSequence;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("chunk size must be at least 1")]
    ZeroChunkSize,
}

/// A contiguous window over an [`UtteranceSequence`].
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Ordinal of this chunk within the video.
    pub position: usize,
    /// Row offset of the first embedding in the sequence.
    pub start: usize,
    /// `(rows, embedding_dim)`, at most `chunk_size` rows.
    pub data: Array2<f32>,
    /// Original utterance index of each row.
    pub indices: Vec<usize>,
}

/// Slices an utterance sequence into fixed-size windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindower {
    size: usize,
    step: usize,
}

impl ChunkWindower {
    /// `step` defaults to `size` (non-overlapping windows).
    pub fn new(size: usize, step: Option<usize>) -> Result<Self, WindowError> {
        if size == 0 {
            return Err(WindowError::ZeroChunkSize);
        }
        let step = match step {
            Some(step) if step > 0 => step,
            _ => size,
        };
        Ok(Self { size, step })
    }

    /// A step of zero or below means non-overlapping windows.
    pub fn from_signed_step(size: usize, step: i64) -> Result<Self, WindowError> {
        Self::new(size, usize::try_from(step).ok())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Lazily yield the windows of `sequence` in order. The last window may
    /// be shorter than the chunk size.
    pub fn windows<'a>(&self, sequence: &'a UtteranceSequence) -> Windows<'a> {
        Windows {
            sequence,
            size: self.size,
            step: self.step,
            start: 0,
            position: 0,
            done: sequence.is_empty(),
        }
    }
}

/// Iterator returned by [`ChunkWindower::windows`].
#[derive(Debug)]
pub struct Windows<'a> {
    sequence: &'a UtteranceSequence,
    size: usize,
    step: usize,
    start: usize,
    position: usize,
    done: bool,
}

impl Iterator for Windows<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let n = self.sequence.len();
        if self.done || self.start >= n {
            return None;
        }
        let start = self.start;
        let end = (start + self.size).min(n);
        let chunk = Chunk {
            position: self.position,
            start,
            data: self.sequence.embeddings.slice(s![start..end, ..]).to_owned(),
            indices: self.sequence.indices[start..end].to_vec(),
        };
        self.position += 1;
        if end == n {
            self.done = true;
        } else {
            self.start += self.step;
        }
        Some(chunk)
    }
}
