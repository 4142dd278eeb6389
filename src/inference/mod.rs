/// Chunked inference over per-utterance embeddings.
///
/// ```text
///   manifest (.json)  ──►  UtteranceSequence
///                               │
///                               ▼
///                        ChunkWindower ──► Chunk ──► ChunkScorer
///                                                        │
///                                                        ▼
///                        PredictionAccumulator ◄── scores per chunk row
///                               │
///                               ▼
///                    per-frame sequence ──► fit_to_length ──► .csv
/// ```

pub mod manifest;
pub mod predict;
pub mod reconstruct;
pub mod scorer;
pub mod window;
