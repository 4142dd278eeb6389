use ndarray::Array2;

/// Convert sequence lengths to a `(lengths.len(), max_length)` validity mask.
///
/// Row `i` holds `lengths[i]` leading `true` values followed by `false`.
/// An empty input gives a `0 × 0` mask.
pub fn len_to_mask(lengths: &[usize]) -> Array2<bool> {
    let max_len = lengths.iter().copied().max().unwrap_or(0);
    let mut mask = Array2::from_elem((lengths.len(), max_len), false);
    for (i, &len) in lengths.iter().enumerate() {
        for t in 0..len {
            mask[[i, t]] = true;
        }
    }
    mask
}
