//! Gini coefficient over balance populations.

/// Gini coefficient of a non-negative population, in [0, 1).
///
/// Uses the sorted O(n log n) formulation
/// `G = 2 * Σ i*x_(i) / (n * Σ x) - (n + 1) / n` with 1-based ranks over
/// ascending values. A population summing to zero has no inequality to
/// measure and yields 0.
pub fn gini(values: &[i64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }

    let mut sorted: Vec<i64> = values.to_vec();
    sorted.sort_unstable();

    let total: i128 = sorted.iter().map(|v| *v as i128).sum();
    if total <= 0 {
        return 0.0;
    }

    let weighted: i128 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (i as i128 + 1) * *v as i128)
        .sum();

    let n_f = n as f64;
    2.0 * weighted as f64 / (n_f * total as f64) - (n_f + 1.0) / n_f
}
