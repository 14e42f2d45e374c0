//! Small numeric helpers shared by the detectors. All zero-denominator
//! cases resolve to a defined value, never NaN.

use std::collections::HashMap;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// stddev / mean. A non-positive mean yields `+inf` (treated as
/// maximally irregular, so regularity checks never divide by zero).
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m <= 0.0 {
        return f64::INFINITY;
    }
    sample_stddev(values) / m
}

/// Consecutive gaps of a non-decreasing timestamp sequence, in seconds.
pub fn inter_arrivals(times: &[i64]) -> Vec<f64> {
    times
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .collect()
}

/// Shannon entropy (bits) of the frequency distribution of `values`.
pub fn value_entropy(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut freq: HashMap<u64, u64> = HashMap::new();
    for &v in values {
        *freq.entry(v).or_insert(0) += 1;
    }
    let n = values.len() as f64;
    freq.values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// Character-level Shannon entropy (bits) of a string.
pub fn label_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut freq: HashMap<u8, u64> = HashMap::new();
    for b in s.bytes() {
        *freq.entry(b).or_insert(0) += 1;
    }
    let n = s.len() as f64;
    freq.values()
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}

/// Nearest-rank percentile of an ascending-sorted slice; `p` in (0, 1].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
