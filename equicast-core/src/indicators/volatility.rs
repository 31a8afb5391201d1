//! Rolling sample standard deviation (ddof = 1).

/// Rolling sample standard deviation over `window` values.
///
/// `NaN` until the window is full or while it contains a `NaN`.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if window < 2 || n < window {
        return result;
    }

    for i in (window - 1)..n {
        let slice = &values[(i + 1 - window)..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = slice.iter().sum::<f64>() / window as f64;
        let ss: f64 = slice.iter().map(|v| (v - mean) * (v - mean)).sum();
        result[i] = (ss / (window - 1) as f64).sqrt();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn sample_std_known_value() {
        // 2, 4, 4, 4, 5, 5, 7, 9: sum of squares 32, n - 1 = 7
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let result = rolling_std(&values, 8);
        assert_approx(result[7], (32.0f64 / 7.0).sqrt(), 1e-12);
        assert!(result[6].is_nan());
    }

    #[test]
    fn nan_prefix_delays_output() {
        let values = [f64::NAN, 1.0, 2.0, 3.0];
        let result = rolling_std(&values, 3);
        assert!(result[2].is_nan());
        assert_approx(result[3], 1.0, 1e-12);
    }
}
