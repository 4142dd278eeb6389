/// Data layer: core types, loading, collation and masking.
///
/// Architecture:
/// ```text
///  .csv / .parquet / .npy
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Array2<f32> / valence series
///   └──────────┘
///        │
///        ▼
///   ┌────────────────────┐
///   │ MultimodalDataset  │  Vec<AlignedExample>, subject / story ids
///   └────────────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ collate   │  pad onto a shared time axis → Batch (+ mask)
///   └──────────┘
/// ```

pub mod collate;
pub mod dataset;
pub mod loader;
pub mod mask;
pub mod model;
