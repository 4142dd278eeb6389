use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Utterance records
// ---------------------------------------------------------------------------

/// One utterance of a video: its frame span and averaged word embedding.
///
/// `embedding` is `None` when no word of the utterance had an embedding;
/// such utterances keep their frame span but are never scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub index: usize,
    pub start_frame: usize,
    /// Inclusive.
    pub end_frame: usize,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// Frame span of an utterance, `start_frame..=end_frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtteranceSpan {
    pub index: usize,
    pub start_frame: usize,
    pub end_frame: usize,
}

/// All utterances of one video in temporal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtteranceManifest {
    pub utterances: Vec<Utterance>,
}

impl UtteranceManifest {
    /// Read a JSON array of utterance records.
    ///
    /// ```json
    /// [
    ///   { "index": 0, "start_frame": 0, "end_frame": 41, "embedding": [0.1, ...] },
    ///   { "index": 1, "start_frame": 42, "end_frame": 80, "embedding": null }
    /// ]
    /// ```
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing manifest {}", path.display()))
    }

    /// Write the manifest as JSON.
    pub fn write_json_file(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string(self).context("serializing manifest")?;
        std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
    }

    /// Frame spans in temporal order.
    pub fn spans(&self) -> Vec<UtteranceSpan> {
        self.utterances
            .iter()
            .map(|u| UtteranceSpan {
                index: u.index,
                start_frame: u.start_frame,
                end_frame: u.end_frame,
            })
            .collect()
    }

    /// Stack the utterances that have an embedding.
    pub fn embedded(&self) -> Result<UtteranceSequence> {
        let mut dim = None;
        let mut indices = Vec::new();
        let mut values = Vec::new();
        for utterance in &self.utterances {
            let Some(embedding) = &utterance.embedding else {
                continue;
            };
            match dim {
                None => dim = Some(embedding.len()),
                Some(d) if d != embedding.len() => bail!(
                    "utterance {}: embedding has {} values, expected {d}",
                    utterance.index,
                    embedding.len()
                ),
                Some(_) => {}
            }
            indices.push(utterance.index);
            values.extend_from_slice(embedding);
        }
        let embeddings = Array2::from_shape_vec((indices.len(), dim.unwrap_or(0)), values)
            .context("stacking utterance embeddings")?;
        Ok(UtteranceSequence {
            indices,
            embeddings,
        })
    }
}

// ---------------------------------------------------------------------------
// UtteranceSequence – windowing input
// ---------------------------------------------------------------------------

/// Embeddings of the scorable utterances, one row each, with the original
/// utterance index of every row.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceSequence {
    pub indices: Vec<usize>,
    pub embeddings: Array2<f32>,
}

impl UtteranceSequence {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> UtteranceManifest {
        UtteranceManifest {
            utterances: vec![
                Utterance {
                    index: 0,
                    start_frame: 0,
                    end_frame: 9,
                    embedding: Some(vec![1.0, 2.0]),
                },
                Utterance {
                    index: 1,
                    start_frame: 10,
                    end_frame: 14,
                    embedding: None,
                },
                Utterance {
                    index: 2,
                    start_frame: 15,
                    end_frame: 30,
                    embedding: Some(vec![3.0, 4.0]),
                },
            ],
        }
    }

    #[test]
    fn embedded_skips_utterances_without_embedding() {
        let seq = manifest().embedded().unwrap();
        assert_eq!(seq.indices, vec![0, 2]);
        assert_eq!(seq.embeddings, ndarray::array![[1.0f32, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn spans_keep_every_utterance() {
        let spans = manifest().spans();
        assert_eq!(spans.len(), 3);
        assert_eq!(
            spans[1],
            UtteranceSpan {
                index: 1,
                start_frame: 10,
                end_frame: 14
            }
        );
    }

    #[test]
    fn ragged_embeddings_are_rejected() {
        let mut m = manifest();
        m.utterances[2].embedding = Some(vec![1.0]);
        assert!(m.embedded().is_err());
    }

    #[test]
    fn json_round_trip_accepts_missing_embedding_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Subject_1_Story_1.json");
        std::fs::write(
            &path,
            r#"[
                {"index": 0, "start_frame": 0, "end_frame": 3, "embedding": [0.5]},
                {"index": 1, "start_frame": 4, "end_frame": 8}
            ]"#,
        )
        .unwrap();

        let m = UtteranceManifest::from_json_file(&path).unwrap();
        assert_eq!(m.utterances[1].embedding, None);

        let out = dir.path().join("copy.json");
        m.write_json_file(&out).unwrap();
        assert_eq!(UtteranceManifest::from_json_file(&out).unwrap(), m);
    }
}
