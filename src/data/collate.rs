use ndarray::{s, Array2, Array3};
use thiserror::Error;

use super::model::{AlignedExample, Batch};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollateError {
    #[error("cannot collate an empty batch")]
    EmptyBatch,
    #[error("example {example} has {found} modalities, expected {expected}")]
    ModalityCount {
        example: usize,
        expected: usize,
        found: usize,
    },
    #[error("example {example}, modality {modality}: feature dim {found}, expected {expected}")]
    FeatureDim {
        example: usize,
        modality: usize,
        expected: usize,
        found: usize,
    },
}

/// Padded output of [`collate_sequences`].
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedBatch {
    /// One `(batch, max_length, feature_dim)` tensor per modality.
    pub modalities: Vec<Array3<f32>>,
    /// Per-example length: max native length over its modalities.
    pub lengths: Vec<usize>,
    /// `order[k]` is the input position of the example at batch row `k`.
    pub order: Vec<usize>,
}

/// Collate examples of any fixed modality count into zero-padded tensors.
///
/// Examples are stable-sorted by descending length of their first
/// modality. All modalities share one padded length: the maximum over
/// every example and every modality.
pub fn collate_sequences(examples: Vec<Vec<Array2<f32>>>) -> Result<PaddedBatch, CollateError> {
    let first = examples.first().ok_or(CollateError::EmptyBatch)?;
    let n_modalities = first.len();
    let dims: Vec<usize> = first.iter().map(|seq| seq.ncols()).collect();

    for (i, example) in examples.iter().enumerate() {
        if example.len() != n_modalities {
            return Err(CollateError::ModalityCount {
                example: i,
                expected: n_modalities,
                found: example.len(),
            });
        }
        for (m, seq) in example.iter().enumerate() {
            if seq.ncols() != dims[m] {
                return Err(CollateError::FeatureDim {
                    example: i,
                    modality: m,
                    expected: dims[m],
                    found: seq.ncols(),
                });
            }
        }
    }

    let mut indexed: Vec<(usize, Vec<Array2<f32>>)> = examples.into_iter().enumerate().collect();
    // sort_by is stable: equal lengths keep their input order
    indexed.sort_by(|(_, a), (_, b)| {
        let la = a.first().map_or(0, |seq| seq.nrows());
        let lb = b.first().map_or(0, |seq| seq.nrows());
        lb.cmp(&la)
    });

    let lengths: Vec<usize> = indexed
        .iter()
        .map(|(_, example)| example.iter().map(|seq| seq.nrows()).max().unwrap_or(0))
        .collect();
    let max_len = lengths.iter().copied().max().unwrap_or(0);
    let batch_size = indexed.len();

    let mut modalities: Vec<Array3<f32>> = dims
        .iter()
        .map(|&dim| Array3::zeros((batch_size, max_len, dim)))
        .collect();

    for (row, (_, example)) in indexed.iter().enumerate() {
        for (m, seq) in example.iter().enumerate() {
            let end = seq.nrows();
            modalities[m]
                .slice_mut(s![row, ..end, ..])
                .assign(&seq.slice(s![..end, ..]));
        }
    }

    let order = indexed.into_iter().map(|(i, _)| i).collect();
    Ok(PaddedBatch {
        modalities,
        lengths,
        order,
    })
}

/// Collate [`AlignedExample`]s into a [`Batch`], sorted by audio length.
pub fn collate(examples: Vec<AlignedExample>) -> Result<Batch, CollateError> {
    let sequences = examples
        .into_iter()
        .map(AlignedExample::into_sequences)
        .collect();
    let PaddedBatch {
        modalities,
        lengths,
        order,
    } = collate_sequences(sequences)?;

    let mut tensors = modalities.into_iter();
    let mut next = || tensors.next().unwrap_or_else(|| Array3::zeros((0, 0, 0)));
    Ok(Batch {
        audio: next(),
        text: next(),
        visual: next(),
        valence: next(),
        lengths,
        order,
    })
}
