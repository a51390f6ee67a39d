/// Cosine similarity between two vectors. Returns `0.0`, never an error, when
/// the vectors differ in length or either has zero norm — a deliberately
/// permissive contract so a malformed or empty embedding just sorts last
/// rather than failing the query.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// The universal cap on how many matches a similarity query ever returns.
pub const MAX_RESULTS: usize = 10;

/// Filters `candidates` to those scoring `>= threshold` against `query`,
/// sorts best-first, breaks ties by original insertion order (a stable sort
/// over the as-given order satisfies this), and truncates to
/// [`MAX_RESULTS`].
pub fn top_similar<T: Clone>(
    query: &[f32],
    candidates: impl IntoIterator<Item = (T, Vec<f32>)>,
    threshold: f32,
) -> Vec<(T, f32)> {
    let mut scored: Vec<(T, f32)> = candidates
        .into_iter()
        .map(|(item, vector)| (item, cosine_similarity(query, &vector)))
        .filter(|(_, score)| *score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(MAX_RESULTS);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn mismatched_lengths_score_zero_not_error() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn top_similar_caps_at_max_results_and_sorts_descending() {
        let query = vec![1.0, 0.0];
        let candidates: Vec<(usize, Vec<f32>)> = (0..15)
            .map(|i| (i, vec![1.0, i as f32 * 0.01]))
            .collect();

        let results = top_similar(&query, candidates, 0.0);
        assert_eq!(results.len(), MAX_RESULTS);
        for window in results.windows(2) {
            assert!(window[0].1 >= window[1].1);
        }
    }

    #[test]
    fn top_similar_filters_below_threshold() {
        let query = vec![1.0, 0.0];
        let candidates = vec![
            ("a".to_string(), vec![1.0, 0.0]),
            ("b".to_string(), vec![0.0, 1.0]),
        ];
        let results = top_similar(&query, candidates, 0.5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
    }
}
