//! Block Gilbert-Moore Coding (BGMC) primitives.
//!
//! The MSB arithmetic coder used by BGMC is, per the specification, an
//! external collaborator: this module defines its contract precisely
//! (`init` / `encode_msb` / `encode_end`, mirroring `ff_bgmc_encode_init`,
//! `ff_bgmc_encode_msb`, and `ff_bgmc_encode_end`) and ships one concrete,
//! swappable implementation of it (`RangeCoder`) so the crate is usable and
//! testable end-to-end without requiring a caller to bring their own.
//!
//! Any type implementing [`BgmcSink`] can be substituted; [`crate::entropy`]
//! and [`crate::block`] only depend on the trait.

use crate::bitstream::BitWriter;
use crate::error::AlsResult;

/// Running state carried across `encode_msb` calls within one block, mirroring
/// the reference encoder's `(high, low, follow)` triple.
#[derive(Clone, Copy, Debug, Default)]
pub struct BgmcState {
    pub high: u32,
    pub low: u32,
    pub follow: u32,
}

/// The BGMC arithmetic-coder contract.
///
/// `k`, `delta`, `max`, `s`, and `sx` are derived by the caller before
/// every call; implementations only need to perform the
/// actual bit-level (or counting-only, when `out` is `None`) encoding.
pub trait BgmcSink {
    /// Clears coder state at the start of a block.
    fn encode_init(&mut self) -> BgmcState {
        BgmcState::default()
    }

    /// Encodes the MSB portion (`residual >> delta`, clipped to `max`) of
    /// `residuals[..count]`. Returns the number of bits used. When `out` is
    /// `None`, performs a counting-only pass (no bits are actually written),
    /// matching the reference contract of passing a null bitstream pointer
    /// to obtain an exact bit count during entropy parameter search.
    fn encode_msb(
        &mut self,
        state: &mut BgmcState,
        out: Option<&mut BitWriter>,
        residuals: &[i32],
        k: u32,
        delta: u32,
        max: u32,
        s: u32,
        sx: u32,
    ) -> AlsResult<u32>;

    /// Flushes carry/follow state at the end of a block. Returns the number
    /// of bits used to do so.
    fn encode_end(&mut self, state: &mut BgmcState, out: Option<&mut BitWriter>) -> AlsResult<u32>;
}

/// A simple carryless range coder used as the default [`BgmcSink`].
///
/// Each MSB symbol `m = min(|residual| >> delta-adjusted k, max)` is coded
/// against a static geometric cumulative distribution parameterized by `sx`
/// (see [`crate::tables::bgmc_max`]); the LSBs below `k` bits are written
/// verbatim by [`encode_lsb`], exactly as the reference two-pass layout
/// (all MSBs, then all LSBs) specifies.
#[derive(Default)]
pub struct RangeCoder;

const TOP: u32 = 1 << 24;

impl RangeCoder {
    fn symbol_for(value: i32, k: u32, max: u32) -> u32 {
        let mapped = crate::bitstream::signed_to_rice_unsigned(value);
        (mapped >> k).min(max)
    }

    /// Cumulative frequency boundaries for a geometric model shaped by `sx`,
    /// over the symbol alphabet `0..=max`.
    fn cum_freq(sx: u32, symbol: u32, max: u32) -> (u32, u32, u32) {
        // A geometric ladder: higher sx means a flatter (less peaked)
        // distribution. Total range kept well under TOP for headroom.
        const SCALE: u32 = 1 << 14;
        let decay = 2 + sx; // larger sx -> slower decay -> flatter model
        let mut cum_lo = 0u64;
        let mut freq_of = 0u64;
        let mut total = 0u64;
        for sym in 0..=max {
            let w = (SCALE as u64) / (decay as u64 + sym as u64);
            let w = w.max(1);
            if sym < symbol {
                cum_lo += w;
            } else if sym == symbol {
                freq_of = w;
            }
            total += w;
        }
        (cum_lo as u32, freq_of as u32, total as u32)
    }
}

impl BgmcSink for RangeCoder {
    fn encode_msb(
        &mut self,
        state: &mut BgmcState,
        mut out: Option<&mut BitWriter>,
        residuals: &[i32],
        k: u32,
        delta: u32,
        max: u32,
        s: u32,
        sx: u32,
    ) -> AlsResult<u32> {
        let _ = s;
        let mut bits = 0u32;
        if state.high == 0 && state.low == 0 {
            *state = BgmcState { high: u32::MAX, low: 0, follow: 0 };
        }

        for &value in residuals {
            let symbol = Self::symbol_for(value, k + delta, max);
            let (cum_lo, freq, total) = Self::cum_freq(sx, symbol, max);
            let range = (state.high - state.low) as u64 + 1;
            let new_high = state.low + ((range * (cum_lo + freq) as u64 / total as u64) as u32) - 1;
            let new_low = state.low + (range * cum_lo as u64 / total as u64) as u32;
            state.high = new_high;
            state.low = new_low;

            while (state.high < TOP) || (state.low >= TOP) {
                if state.high < TOP {
                    if let Some(w) = out.as_deref_mut() {
                        w.write_bits(0, 1)?;
                        for _ in 0..state.follow {
                            w.write_bits(1, 1)?;
                        }
                    }
                    bits += 1 + state.follow;
                    state.follow = 0;
                } else {
                    if let Some(w) = out.as_deref_mut() {
                        w.write_bits(1, 1)?;
                        for _ in 0..state.follow {
                            w.write_bits(0, 1)?;
                        }
                    }
                    bits += 1 + state.follow;
                    state.follow = 0;
                    state.low -= TOP;
                    state.high -= TOP;
                }
                state.low <<= 1;
                state.high = (state.high << 1) | 1;
            }
        }
        Ok(bits)
    }

    fn encode_end(&mut self, state: &mut BgmcState, mut out: Option<&mut BitWriter>) -> AlsResult<u32> {
        state.follow += 1;
        let bit = if state.low < TOP / 2 { 0 } else { 1 };
        if let Some(w) = out.as_deref_mut() {
            w.write_bits(bit, 1)?;
            for _ in 0..state.follow {
                w.write_bits(1 - bit, 1)?;
            }
        }
        Ok(1 + state.follow)
    }
}

/// Estimates the MSB pass bit count for `residuals` under `sx` without
/// running the range coder: the ideal code length `-log2(freq/total)` of
/// each symbol under the same geometric model [`RangeCoder::encode_msb`]
/// uses, summed and rounded up. Cheaper than an instrumented encode since
/// it skips the renormalization loop entirely, at the cost of ignoring the
/// few bits of rounding overhead that loop actually spends.
pub fn estimate_msb_bits(residuals: &[i32], k: u32, delta: u32, max: u32, sx: u32) -> u32 {
    let mut bits = 0.0f64;
    for &value in residuals {
        let symbol = RangeCoder::symbol_for(value, k + delta, max);
        let (_, freq, total) = RangeCoder::cum_freq(sx, symbol, max);
        if freq > 0 {
            bits += (total as f64 / freq as f64).log2();
        }
    }
    bits.ceil() as u32
}

/// Writes the LSB portion (the low `k` bits of each mapped residual) of a
/// sub-block verbatim, the second of BGMC's two coding passes.
pub fn encode_lsb(out: Option<&mut BitWriter>, residuals: &[i32], k: u32) -> AlsResult<u32> {
    if k == 0 {
        return Ok(0);
    }
    let mut bits = 0u32;
    match out {
        Some(w) => {
            for &value in residuals {
                let mapped = crate::bitstream::signed_to_rice_unsigned(value);
                w.write_bits(mapped & ((1u32 << k) - 1), k as u8)?;
            }
        }
        None => {}
    }
    bits += residuals.len() as u32 * k;
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_write_agree_on_bit_length() {
        let residuals = [1i32, -2, 3, -4, 5, -6, 7, 0, 0, 1];
        let mut coder = RangeCoder::default();
        let mut state = coder.encode_init();
        let count = coder
            .encode_msb(&mut state, None, &residuals, 1, 2, 63, 3, 4)
            .unwrap();
        let mut end_state = state;
        let end_count = coder.encode_end(&mut end_state, None).unwrap();

        let mut writer = BitWriter::new(4096);
        let mut coder2 = RangeCoder::default();
        let mut state2 = coder2.encode_init();
        coder2
            .encode_msb(&mut state2, Some(&mut writer), &residuals, 1, 2, 63, 3, 4)
            .unwrap();
        coder2.encode_end(&mut state2, Some(&mut writer)).unwrap();
        assert_eq!((count + end_count) as usize, writer.bit_position());
    }

    #[test]
    fn lsb_pass_counts_k_bits_per_sample() {
        let residuals = [1i32, -2, 3];
        assert_eq!(encode_lsb(None, &residuals, 3).unwrap(), 9);
        assert_eq!(encode_lsb(None, &residuals, 0).unwrap(), 0);
    }
}
