use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Maps a chunk of utterance embeddings `(rows, dim)` to one score per row.
pub trait ChunkScorer {
    fn score(&mut self, chunk: ArrayView2<'_, f32>) -> Result<Vec<f32>>;
}

impl<F> ChunkScorer for F
where
    F: FnMut(ArrayView2<'_, f32>) -> Result<Vec<f32>>,
{
    fn score(&mut self, chunk: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        self(chunk)
    }
}

/// Per-row linear readout: `score = embedding · weights + bias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearScorer {
    pub weights: Vec<f32>,
    #[serde(default)]
    pub bias: f32,
}

impl LinearScorer {
    /// Read `{ "weights": [...], "bias": 0.0 }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scorer weights {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing scorer weights {}", path.display()))
    }
}

impl ChunkScorer for LinearScorer {
    fn score(&mut self, chunk: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        if chunk.ncols() != self.weights.len() {
            bail!(
                "embedding dim {} does not match {} scorer weights",
                chunk.ncols(),
                self.weights.len()
            );
        }
        let weights = Array1::from_vec(self.weights.clone());
        Ok(chunk.dot(&weights).iter().map(|v| v + self.bias).collect())
    }
}
