use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::manifest::UtteranceSpan;
use super::window::Chunk;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("chunk {position}: scorer returned {found} scores for {expected} rows")]
    ScoreCount {
        position: usize,
        expected: usize,
        found: usize,
    },
}

/// What the scorer was trained to predict per utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionMode {
    /// The valence value itself.
    #[default]
    Absolute,
    /// The change in valence since the previous utterance.
    Difference,
}

/// Collects chunk scores per original utterance index.
#[derive(Debug, Clone, Default)]
pub struct PredictionAccumulator {
    scores: BTreeMap<usize, Vec<f32>>,
}

impl PredictionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one score per chunk row to that row's utterance.
    pub fn record(&mut self, chunk: &Chunk, scores: &[f32]) -> Result<(), ReconstructError> {
        if scores.len() != chunk.indices.len() {
            return Err(ReconstructError::ScoreCount {
                position: chunk.position,
                expected: chunk.indices.len(),
                found: scores.len(),
            });
        }
        for (&index, &score) in chunk.indices.iter().zip(scores) {
            self.scores.entry(index).or_default().push(score);
        }
        Ok(())
    }

    /// Mean of every score recorded for `index`.
    pub fn mean(&self, index: usize) -> Option<f32> {
        let scores = self.scores.get(&index)?;
        if scores.is_empty() {
            return None;
        }
        let sum: f64 = scores.iter().map(|&s| s as f64).sum();
        Some((sum / scores.len() as f64) as f32)
    }

    /// Number of utterances with at least one score.
    pub fn covered(&self) -> usize {
        self.scores.len()
    }

    /// Build the per-frame sequence, walking `spans` in temporal order.
    ///
    /// An utterance without scores repeats the previous value (0.0 before
    /// the first scored utterance).
    pub fn reconstruct(&self, spans: &[UtteranceSpan], mode: PredictionMode) -> Vec<f32> {
        let mut sequence = Vec::new();
        let mut prev = 0.0f32;
        for span in spans {
            if let Some(value) = self.mean(span.index) {
                prev = match mode {
                    PredictionMode::Difference => prev + value,
                    PredictionMode::Absolute => value,
                };
            }
            fill_span(&mut sequence, prev, span.start_frame, span.end_frame);
        }
        sequence
    }
}

/// Write `value` to frames `start..=end`. Frames already present are
/// overwritten; a gap before `start` is filled with `value` as well.
pub fn fill_span(sequence: &mut Vec<f32>, value: f32, start: usize, end: usize) {
    if end < start {
        return;
    }
    if sequence.len() < start {
        sequence.resize(start, value);
    }
    for frame in start..=end {
        match sequence.get_mut(frame) {
            Some(slot) => *slot = value,
            None => sequence.push(value),
        }
    }
}

/// Truncate to `len` frames, or pad by repeating the last value (0.0 for
/// an empty sequence).
pub fn fit_to_length(mut sequence: Vec<f32>, len: usize) -> Vec<f32> {
    let last = sequence.last().copied().unwrap_or(0.0);
    sequence.resize(len, last);
    sequence
}
