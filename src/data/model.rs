use std::fmt;

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use super::mask::len_to_mask;

// ---------------------------------------------------------------------------
// Modality – one feature source describing a video
// ---------------------------------------------------------------------------

/// The input modalities plus the valence target, in tuple order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Audio,
    Text,
    Visual,
    Valence,
}

impl Modality {
    /// All sources in the order they appear in an [`AlignedExample`].
    pub const ALL: [Modality; 4] = [
        Modality::Audio,
        Modality::Text,
        Modality::Visual,
        Modality::Valence,
    ];
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Modality::Audio => "audio",
            Modality::Text => "text",
            Modality::Visual => "visual",
            Modality::Valence => "valence",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// VideoId – subject / story pair parsed from file names
// ---------------------------------------------------------------------------

/// Identifies a source video, e.g. `Subject_3_Story_5`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VideoId {
    pub subject: String,
    pub story: String,
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subject_{}_Story_{}", self.subject, self.story)
    }
}

// ---------------------------------------------------------------------------
// AlignedExample – one video (or video segment) across all sources
// ---------------------------------------------------------------------------

/// Audio, text, visual and valence sequences covering the same time span.
///
/// Every sequence is `(time, feature_dim)`. Native lengths may differ
/// slightly between sources; valence is already at chunk resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedExample {
    pub audio: Array2<f32>,
    pub text: Array2<f32>,
    pub visual: Array2<f32>,
    pub valence: Array2<f32>,
}

impl AlignedExample {
    /// Borrow the sequence for one source.
    pub fn sequence(&self, modality: Modality) -> &Array2<f32> {
        match modality {
            Modality::Audio => &self.audio,
            Modality::Text => &self.text,
            Modality::Visual => &self.visual,
            Modality::Valence => &self.valence,
        }
    }

    /// Native sequence lengths in [`Modality::ALL`] order.
    pub fn lengths(&self) -> [usize; 4] {
        Modality::ALL.map(|m| self.sequence(m).nrows())
    }

    /// Whether all four sources have the same number of time steps.
    pub fn is_aligned(&self) -> bool {
        let lengths = self.lengths();
        lengths.iter().all(|&l| l == lengths[0])
    }

    pub(crate) fn into_sequences(self) -> Vec<Array2<f32>> {
        vec![self.audio, self.text, self.visual, self.valence]
    }
}

// ---------------------------------------------------------------------------
// Batch – collated, zero-padded examples
// ---------------------------------------------------------------------------

/// A batch of [`AlignedExample`]s padded onto one shared time axis.
///
/// Each tensor is `(batch, max_length, feature_dim)`; rows past
/// `lengths[i]` are exactly zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub audio: Array3<f32>,
    pub text: Array3<f32>,
    pub visual: Array3<f32>,
    pub valence: Array3<f32>,
    /// Per-example length: max native length over the four sources.
    pub lengths: Vec<usize>,
    /// `order[k]` is the input position of the example at batch row `k`.
    pub order: Vec<usize>,
}

impl Batch {
    /// Number of examples.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Whether the batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Shared padded length of the time axis.
    pub fn max_length(&self) -> usize {
        self.audio.shape()[1]
    }

    /// Borrow the padded tensor for one source.
    pub fn tensor(&self, modality: Modality) -> &Array3<f32> {
        match modality {
            Modality::Audio => &self.audio,
            Modality::Text => &self.text,
            Modality::Visual => &self.visual,
            Modality::Valence => &self.valence,
        }
    }

    /// Validity mask over `(batch, max_length)` for loss masking.
    pub fn mask(&self) -> ndarray::Array2<bool> {
        len_to_mask(&self.lengths)
    }
}
