//! Small descriptive statistics shared by the detectors.

/// Spreads at or below this are treated as zero. Scores are never computed from them.
pub const EPSILON: f64 = 1e-12;

/// Floor for an interquartile range of percentage returns used as a score divisor.
///
/// Prices carry four decimals, so near-flat series produce quartile spreads far
/// below any real move. Dividing by them yields scores in the millions.
pub const MIN_RETURN_SPREAD: f64 = 1e-4;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Standard deviation with the n-1 denominator.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mu = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - mu).powi(2)).sum();
    Some((sum_sq / (values.len() - 1) as f64).sqrt())
}

/// Quantile of an ascending slice, interpolating linearly between order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// The `len` values ending at `end` (inclusive), or `None` if the span starts
/// before the series or contains an undefined value.
pub fn trailing(values: &[Option<f64>], end: usize, len: usize) -> Option<Vec<f64>> {
    if len == 0 || end >= values.len() || end + 1 < len {
        return None;
    }
    values[end + 1 - len..=end].iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sample_std_uses_n_minus_one() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values).unwrap(), 5.0);
        assert_relative_eq!(sample_std(&values).unwrap(), (32.0_f64 / 7.0).sqrt());
        assert!(sample_std(&[1.0]).is_none());
    }

    #[test]
    fn quantiles_interpolate_between_order_statistics() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(quantile(&sorted, 0.25).unwrap(), 1.75);
        assert_relative_eq!(quantile(&sorted, 0.5).unwrap(), 2.5);
        assert_relative_eq!(quantile(&sorted, 0.75).unwrap(), 3.25);
        assert_relative_eq!(quantile(&sorted, 1.0).unwrap(), 4.0);
        assert!(quantile(&[], 0.5).is_none());
    }

    #[test]
    fn trailing_rejects_short_or_gapped_spans() {
        let values = [None, Some(1.0), Some(2.0), Some(3.0)];
        assert_eq!(trailing(&values, 3, 3), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(trailing(&values, 3, 4), None);
        assert_eq!(trailing(&values, 2, 4), None);
        assert_eq!(trailing(&values, 4, 1), None);
    }
}
