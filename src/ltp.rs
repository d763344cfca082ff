//! Long-term prediction (LTP): lag search, 5-tap gain estimation and
//! quantization, and residual generation.

use crate::config::LtpCoeffAlgorithm;
use crate::signal::HistoryView;
use crate::tables;

/// Largest lag the LTP search considers, in samples. Also the minimum
/// history padding every channel stream must carry (`history_pad`).
pub const LTP_MAX_LAG: usize = 2048;

const NUM_TAPS: usize = 5;

/// A committed LTP descriptor for one block (subset of `Block`
/// fields): a gain per tap plus the lag, all already quantized.
#[derive(Debug, Clone)]
pub struct LtpParams {
    pub lag: u16,
    pub gain_indices: [u8; NUM_TAPS],
    pub gains: [i16; NUM_TAPS],
}

/// Searches lags `order..LTP_MAX_LAG` (bounded by available history) for the
/// one maximizing the normalized cross-correlation between the current
/// block and the lagged history.
pub fn search_lag(history: &HistoryView, block_len: usize, min_lag: usize) -> Option<u16> {
    let max_lag = history.history_len().min(LTP_MAX_LAG);
    if max_lag < min_lag.max(1) {
        return None;
    }

    let mut best_lag = None;
    let mut best_score = 0.0f64;

    for lag in min_lag.max(1)..=max_lag {
        let mut cross = 0.0f64;
        let mut energy = 0.0f64;
        for t in 0..block_len {
            let x = history.at(t as isize) as f64;
            let y = history.at(t as isize - lag as isize) as f64;
            cross += x * y;
            energy += y * y;
        }
        if energy <= 0.0 {
            continue;
        }
        let score = cross * cross / energy;
        if score > best_score {
            best_score = score;
            best_lag = Some(lag as u16);
        }
    }

    best_lag
}

/// Estimates the 5-tap gains for a given lag, using either the fixed
/// single-tap-dominant heuristic (`Fixed`) or a 5x5 normal-equations solve
/// (`Cholesky`).
pub fn estimate_gains(
    history: &HistoryView,
    block_len: usize,
    lag: u16,
    algorithm: LtpCoeffAlgorithm,
) -> [f64; NUM_TAPS] {
    match algorithm {
        LtpCoeffAlgorithm::Fixed => fixed_gains(history, block_len, lag),
        LtpCoeffAlgorithm::Cholesky => cholesky_gains(history, block_len, lag),
    }
}

fn tap_offset(tap: usize) -> isize {
    // Taps are centered on the lag: -2, -1, 0 (the lag itself), +1, +2.
    tap as isize - 2
}

fn fixed_gains(history: &HistoryView, block_len: usize, lag: u16) -> [f64; NUM_TAPS] {
    let mut cross = [0.0f64; NUM_TAPS];
    let mut energy = [0.0f64; NUM_TAPS];
    for t in 0..block_len {
        let x = history.at(t as isize) as f64;
        for tap in 0..NUM_TAPS {
            let y = history.at(t as isize - lag as isize + tap_offset(tap)) as f64;
            cross[tap] += x * y;
            energy[tap] += y * y;
        }
    }
    let mut gains = [0.0f64; NUM_TAPS];
    for tap in 0..NUM_TAPS {
        gains[tap] = if energy[tap] > 0.0 { cross[tap] / energy[tap] } else { 0.0 };
    }
    gains
}

/// Solves the 5x5 normal-equations system via Cholesky decomposition for the
/// jointly optimal 5-tap gains.
fn cholesky_gains(history: &HistoryView, block_len: usize, lag: u16) -> [f64; NUM_TAPS] {
    let mut r = [[0.0f64; NUM_TAPS]; NUM_TAPS];
    let mut p = [0.0f64; NUM_TAPS];

    for t in 0..block_len {
        let x = history.at(t as isize) as f64;
        let mut taps = [0.0f64; NUM_TAPS];
        for tap in 0..NUM_TAPS {
            taps[tap] = history.at(t as isize - lag as isize + tap_offset(tap)) as f64;
        }
        for i in 0..NUM_TAPS {
            p[i] += x * taps[i];
            for j in 0..NUM_TAPS {
                r[i][j] += taps[i] * taps[j];
            }
        }
    }

    for i in 0..NUM_TAPS {
        r[i][i] += 1e-6;
    }

    match cholesky_solve(&r, &p) {
        Some(g) => g,
        None => fixed_gains_from_precomputed(&r, &p),
    }
}

fn fixed_gains_from_precomputed(r: &[[f64; NUM_TAPS]; NUM_TAPS], p: &[f64; NUM_TAPS]) -> [f64; NUM_TAPS] {
    let mut gains = [0.0f64; NUM_TAPS];
    for tap in 0..NUM_TAPS {
        gains[tap] = if r[tap][tap] > 0.0 { p[tap] / r[tap][tap] } else { 0.0 };
    }
    gains
}

fn cholesky_solve(a: &[[f64; NUM_TAPS]; NUM_TAPS], b: &[f64; NUM_TAPS]) -> Option<[f64; NUM_TAPS]> {
    let mut l = [[0.0f64; NUM_TAPS]; NUM_TAPS];
    for i in 0..NUM_TAPS {
        for j in 0..=i {
            let mut sum = a[i][j];
            for k in 0..j {
                sum -= l[i][k] * l[j][k];
            }
            if i == j {
                if sum <= 0.0 {
                    return None;
                }
                l[i][j] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    let mut y = [0.0f64; NUM_TAPS];
    for i in 0..NUM_TAPS {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i][k] * y[k];
        }
        y[i] = sum / l[i][i];
    }

    let mut x = [0.0f64; NUM_TAPS];
    for i in (0..NUM_TAPS).rev() {
        let mut sum = y[i];
        for k in (i + 1)..NUM_TAPS {
            sum -= l[k][i] * x[k];
        }
        x[i] = sum / l[i][i];
    }

    Some(x)
}

/// Quantizes floating-point gains to the nearest entry in the 16-entry gain
/// table.
pub fn quantize_gains(gains: [f64; NUM_TAPS]) -> ([u8; NUM_TAPS], [i16; NUM_TAPS]) {
    let mut indices = [0u8; NUM_TAPS];
    let mut quantized = [0i16; NUM_TAPS];
    for tap in 0..NUM_TAPS {
        let target = (gains[tap] * 32.0).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        let idx = tables::ltp_gain_table_nearest(target);
        indices[tap] = idx as u8;
        quantized[tap] = tables::LTP_GAIN_TABLE[idx];
    }
    (indices, quantized)
}

/// Predicts the LTP contribution for sample `t`, applying the 5-tap filter
/// to the short-term residual stream (LTP operates on residuals, applied
/// after short-term prediction).
fn predict_one(residual_history: &HistoryView, gains: &[i16; NUM_TAPS], lag: u16, t: isize) -> i64 {
    let mut y: i64 = 1 << 6;
    for tap in 0..NUM_TAPS {
        let idx = t - lag as isize + tap_offset(tap);
        y += gains[tap] as i64 * residual_history.at(idx) as i64;
    }
    y >> 7
}

/// Applies LTP on top of the short-term residual stream, producing the
/// final residual to entropy-code.
pub fn generate_ltp_residuals(
    residual_history: &HistoryView,
    params: &LtpParams,
    length: usize,
) -> Vec<i32> {
    let mut out = Vec::with_capacity(length);
    for t in 0..length {
        let pred = predict_one(residual_history, &params.gains, params.lag, t as isize);
        let x = residual_history.at(t as isize);
        out.push((x as i64 - pred) as i32);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_lag_finds_exact_periodicity() {
        let mut data = vec![0i32; 4100];
        for i in 0..data.len() {
            data[i] = ((i % 100) as i32) * 7;
        }
        let view = HistoryView::new(&data, 2048);
        let lag = search_lag(&view, 512, 90).expect("should find a lag");
        assert_eq!(lag % 100, 0);
    }

    #[test]
    fn quantize_gains_picks_nearest_table_entries() {
        let (indices, gains) = quantize_gains([1.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(indices[0] < tables::LTP_GAIN_TABLE.len() as u8);
        assert_eq!(gains[0], tables::LTP_GAIN_TABLE[indices[0] as usize]);
    }

    #[test]
    fn ltp_residual_of_perfectly_predicted_signal_shrinks() {
        let mut data = vec![0i32; 600];
        for i in 0..data.len() {
            data[i] = ((i % 50) as i32) * 3;
        }
        let view = HistoryView::new(&data, 400);
        let params = LtpParams {
            lag: 50,
            gain_indices: [0; NUM_TAPS],
            gains: [0, 0, 64 * 32 / 32, 0, 0],
        };
        let residuals = generate_ltp_residuals(&view, &params, 100);
        let original_energy: i64 = (0..100).map(|t| (view.at(t as isize) as i64).pow(2)).sum();
        let residual_energy: i64 = residuals.iter().map(|&r| (r as i64).pow(2)).sum();
        assert!(residual_energy <= original_energy);
    }
}
