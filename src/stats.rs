//! Small descriptive statistics used across the engine.
//!
//! All helpers return a neutral `0.0` (or `None` where the caller needs to
//! tell "no data" apart from zero) on empty input instead of panicking.

use std::cmp::Ordering;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Nearest-rank percentile over an already sorted slice.
pub fn percentile_nearest_rank(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    Some(sorted[index])
}

/// Median on the nearest-rank scale, consistent with the quartiles.
pub fn median(sorted: &[f64]) -> Option<f64> {
    percentile_nearest_rank(sorted, 50.0)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / values.len() as f64;
    Some(variance.sqrt())
}

/// Share (0-100) of `population` at or below `value`.
pub fn percentile_rank(population: &[f64], value: f64) -> f64 {
    if population.is_empty() {
        return 0.0;
    }
    let at_or_below = population.iter().filter(|v| **v <= value).count();
    at_or_below as f64 / population.len() as f64 * 100.0
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_inputs_are_neutral() {
        assert_eq!(mean(&[]), None);
        assert_eq!(median(&[]), None);
        assert_eq!(std_dev(&[]), None);
        assert_eq!(percentile_rank(&[], 3.0), 0.0);
        assert_eq!(percentage(3, 0), 0.0);
    }

    #[test]
    fn nearest_rank_quartiles_are_ordered() {
        let values = sorted(&[40.0, 3.0, 12.0, 7.0, 21.0, 9.0, 1.0]);
        let p25 = percentile_nearest_rank(&values, 25.0).unwrap();
        let p50 = median(&values).unwrap();
        let p75 = percentile_nearest_rank(&values, 75.0).unwrap();
        assert_eq!(p25, 3.0);
        assert_eq!(p50, 9.0);
        assert_eq!(p75, 21.0);
        assert!(p25 <= p50 && p50 <= p75);
    }

    #[test]
    fn single_value_percentiles() {
        let values = [5.0];
        assert_eq!(percentile_nearest_rank(&values, 1.0), Some(5.0));
        assert_eq!(percentile_nearest_rank(&values, 100.0), Some(5.0));
    }

    #[test]
    fn std_dev_matches_known_value() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&values).unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(std_dev(&[3.0, 3.0, 3.0]), Some(0.0));
    }

    #[test]
    fn percentile_rank_counts_ties() {
        let population = [1.0, 2.0, 2.0, 4.0];
        assert_eq!(percentile_rank(&population, 2.0), 75.0);
        assert_eq!(percentile_rank(&population, 4.0), 100.0);
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round_to(2.345, 1), 2.3);
        assert_eq!(round_to(-1.666, 2), -1.67);
        assert_eq!(percentage(3, 100), 3.0);
    }
}
