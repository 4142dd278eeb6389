//! Multimodal valence prediction core: dataset loading, batch collation and
//! chunked inference with frame-level sequence reconstruction.

pub mod data;
pub mod inference;
pub mod sweep;
