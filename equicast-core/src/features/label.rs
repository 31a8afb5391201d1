//! Forward-return labelling.

/// (close[t + h] - close[t]) / close[t], or `None` past the end of the series.
pub fn forward_return(closes: &[f64], t: usize, horizon: usize) -> Option<f64> {
    let future = *closes.get(t + horizon)?;
    let now = *closes.get(t)?;
    let r = (future - now) / now;
    r.is_finite().then_some(r)
}

/// 1 if the forward return strictly exceeds the threshold, else 0.
pub fn label_direction(closes: &[f64], t: usize, horizon: usize, threshold: f64) -> Option<u8> {
    forward_return(closes, t, horizon).map(|r| u8::from(r > threshold))
}
