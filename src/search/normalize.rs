/// Min-max rescale a score vector to [0, 1].
///
/// This is the only mechanism the pipeline uses to make heterogeneous
/// score distributions (cosine similarity, BM25, RRF mass) comparable.
/// A constant vector (including a single element) maps to all `1.0`:
/// one candidate with no competition is a full-confidence candidate,
/// not a zero. Empty input yields empty output.
pub fn min_max(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    if max == min {
        return vec![1.0; scores.len()];
    }

    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_and_extremes() {
        let normalized = min_max(&[0.5, 0.8, 0.3, 0.9, 0.1]);
        assert!(normalized.iter().all(|s| (0.0..=1.0).contains(s)));
        assert_eq!(normalized.iter().cloned().fold(f32::NEG_INFINITY, f32::max), 1.0);
        assert_eq!(normalized.iter().cloned().fold(f32::INFINITY, f32::min), 0.0);
    }

    #[test]
    fn test_preserves_order() {
        let normalized = min_max(&[3.0, 1.0, 2.0]);
        assert!(normalized[0] > normalized[2] && normalized[2] > normalized[1]);
    }

    #[test]
    fn test_all_equal_maps_to_one() {
        assert_eq!(min_max(&[0.5, 0.5, 0.5]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_single_element() {
        assert_eq!(min_max(&[42.0]), vec![1.0]);
    }

    #[test]
    fn test_empty() {
        assert!(min_max(&[]).is_empty());
    }

    #[test]
    fn test_negative_inputs() {
        let normalized = min_max(&[-2.0, 0.0, 2.0]);
        assert_eq!(normalized, vec![0.0, 0.5, 1.0]);
    }
}
