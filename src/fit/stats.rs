//! Robust per-parameter statistics across trials.

use core::cmp::Ordering::Equal;

/// Scale making the MAD a consistent estimator of a normal standard deviation.
pub const MAD_NORMAL_SCALE: f64 = 1.482_602_218_505_602;

/// Median, computed in place with quickselect. Empty input yields NaN.
pub fn median_inplace(vals: &mut [f64]) -> f64 {
    let n = vals.len();
    if n == 0 {
        return f64::NAN;
    }
    let mid = n / 2;
    vals.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap_or(Equal));
    let upper = vals[mid];
    if !n.is_multiple_of(2) {
        return upper;
    }
    // Even length: the lower middle is the largest value left of `mid`.
    let lower = vals[..mid]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    (lower + upper) / 2.0
}

/// Median absolute deviation scaled by [`MAD_NORMAL_SCALE`].
pub fn scaled_mad(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    let mut work = vals.to_vec();
    let median = median_inplace(&mut work);
    for val in work.iter_mut() {
        *val = (*val - median).abs();
    }
    MAD_NORMAL_SCALE * median_inplace(&mut work)
}

/// Column-wise median and scaled MAD. The widest row sets the column count;
/// a shorter row contributes nothing to the columns it lacks.
pub fn column_median_mad(rows: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut medians = Vec::with_capacity(width);
    let mut spreads = Vec::with_capacity(width);
    let mut column = Vec::with_capacity(rows.len());
    for j in 0..width {
        column.clear();
        column.extend(rows.iter().filter_map(|row| row.get(j).copied()));
        spreads.push(scaled_mad(&column));
        medians.push(median_inplace(&mut column));
    }
    (medians, spreads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn median_of_odd_and_even_lengths() {
        assert_eq!(median_inplace(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median_inplace(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median_inplace(&mut [7.0]), 7.0);
        assert!(median_inplace(&mut []).is_nan());
    }

    #[test]
    fn mad_ignores_a_single_outlier() {
        let spread = scaled_mad(&[1.0, 1.1, 0.9, 1.0, 50.0]);

        assert_relative_eq!(spread, MAD_NORMAL_SCALE * 0.1, epsilon = 1e-12);
    }

    #[test]
    fn single_trial_has_zero_spread() {
        let rows = vec![vec![0.6, 1.2, -0.3]];

        let (medians, spreads) = column_median_mad(&rows);

        assert_eq!(medians, vec![0.6, 1.2, -0.3]);
        assert_eq!(spreads, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn columns_are_aggregated_independently() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 30.0], vec![3.0, 20.0]];

        let (medians, spreads) = column_median_mad(&rows);

        assert_eq!(medians, vec![2.0, 20.0]);
        assert_relative_eq!(spreads[0], MAD_NORMAL_SCALE, epsilon = 1e-12);
        assert_relative_eq!(spreads[1], MAD_NORMAL_SCALE * 10.0, epsilon = 1e-12);
    }

    #[test]
    fn short_rows_skip_missing_columns() {
        let rows = vec![vec![1.0, 10.0], vec![3.0], vec![2.0, 30.0]];

        let (medians, spreads) = column_median_mad(&rows);

        assert_eq!(medians, vec![2.0, 20.0]);
        assert_relative_eq!(spreads[1], MAD_NORMAL_SCALE * 10.0, epsilon = 1e-12);
    }

    #[test]
    fn no_rows_give_no_columns() {
        let (medians, spreads) = column_median_mad(&[]);

        assert!(medians.is_empty());
        assert!(spreads.is_empty());
    }
}
