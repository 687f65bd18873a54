//! Numeric helpers shared by feature extraction and scoring
//!
//! Every function is total: degenerate input yields a neutral value instead
//! of an error, so a single missing input never halts scoring.

/// Min-max normalize `value` into [0, 1]
///
/// Bounds may be given in either order. Returns 0.5 when the bounds are
/// equal or any argument is NaN.
pub fn normalize(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() || lo.is_nan() || hi.is_nan() || lo == hi {
        return 0.5;
    }
    let (lo, hi) = if lo < hi { (lo, hi) } else { (hi, lo) };
    clamp((value - lo) / (hi - lo), 0.0, 1.0)
}

/// Clamp `value` into [lo, hi]; NaN maps to `lo`
pub fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

/// Relative strength index with Wilder smoothing
///
/// Returns 50.0 with fewer than `period + 1` samples or a flat series, and
/// 100.0 when there were gains but no losses.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss = -seed.iter().filter(|c| **c < 0.0).sum::<f64>() / period as f64;

    let n = period as f64;
    for change in rest {
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
    }

    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Exponential moving average, seeded with the simple mean of the first
/// `period` values
///
/// Falls back to the simple mean when there are fewer than `period`
/// samples and to 0.0 on empty input.
pub fn ema(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if period == 0 || values.len() < period {
        return mean(values);
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = mean(&values[..period]);
    values[period..]
        .iter()
        .fold(seed, |acc, v| v * k + acc * (1.0 - k))
}

/// True when the fast EMA sits above the slow EMA
pub fn ema_cross(values: &[f64], fast: usize, slow: usize) -> bool {
    ema(values, fast) > ema(values, slow)
}

/// Coefficient of variation (population std / |mean|)
pub fn volatility(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt() / m.abs()
}

/// Percentage change over the last `period` samples
pub fn trailing_return(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() <= period {
        return None;
    }
    let last = *values.last()?;
    let base = values[values.len() - 1 - period];
    if base == 0.0 || !base.is_finite() || !last.is_finite() {
        return None;
    }
    Some((last / base - 1.0) * 100.0)
}

/// Trailing returns for several periods, 0.0 where history is too short
pub fn trailing_returns(values: &[f64], periods: &[usize]) -> Vec<f64> {
    periods
        .iter()
        .map(|p| trailing_return(values, *p).unwrap_or(0.0))
        .collect()
}

/// Median of the finite values
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Current volume relative to the median of `history`
///
/// 1.0 on empty history or a non-positive median.
pub fn volume_ratio(current: f64, history: &[f64]) -> f64 {
    match median(history) {
        Some(m) if m > 0.0 => {
            let ratio = current / m;
            if ratio.is_finite() {
                ratio.max(0.0)
            } else {
                1.0
            }
        }
        _ => 1.0,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
