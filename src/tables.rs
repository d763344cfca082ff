//! Static lookup tables and table-shaped helper functions used by the
//! PARCOR/LPC and BGMC stages.
//!
//! A few of these tables (the per-`coef_table` PARCOR Rice parameters, the
//! BGMC per-`sx` maximum symbol table) exist in the reference encoder as
//! opaque precomputed data tables (`als_data.h`) that were not part of the
//! retrieved source for this project. Where the defining formula is fully
//! specified, the value is computed directly rather than guessed (see
//! [`parcor_scaled_value`]); where only the *shape* of the table is
//! specified (monotonically shrinking Rice parameters, a 16-entry geometric
//! BGMC ladder), a concrete, internally consistent table is provided and the
//! choice is recorded in `DESIGN.md`.

/// Number of coefficient-table variants selectable via `coef_table` (0..=2;
/// `coef_table == 3` bypasses this table entirely in favor of plain 7-bit
/// unsigned coding, see [`crate::block`]).
pub const NUM_COEF_TABLES: usize = 3;

/// Per-`coef_table`, per-index `(offset, rice_k)` pairs for PARCOR
/// coefficient indices 0..20. Index 0's reflection coefficient clusters
/// near -64 (a reflection coefficient near -1), so its offset is strongly
/// negative; later indices cluster near zero.
pub const PARCOR_RICE_TABLE: [[(i32, u8); 20]; NUM_COEF_TABLES] = [
    // coef_table 0: general-purpose default.
    [
        (-52, 4), (30, 4), (-24, 4), (16, 4), (-12, 3), (8, 3), (-6, 3), (5, 3),
        (-4, 3), (3, 2), (-3, 2), (2, 2), (-2, 2), (1, 2), (-1, 2), (1, 1),
        (-1, 1), (0, 1), (0, 1), (0, 1),
    ],
    // coef_table 1: tuned for higher sample rates / deeper bit depths.
    [
        (-56, 5), (34, 4), (-27, 4), (19, 4), (-14, 4), (10, 3), (-7, 3), (6, 3),
        (-5, 3), (4, 3), (-3, 2), (3, 2), (-2, 2), (2, 2), (-1, 2), (1, 2),
        (-1, 1), (1, 1), (0, 1), (0, 1),
    ],
    // coef_table 2: tuned for the highest orders (block_switching/BGMC tier).
    [
        (-58, 5), (36, 5), (-29, 4), (21, 4), (-15, 4), (11, 4), (-8, 3), (7, 3),
        (-5, 3), (5, 3), (-4, 2), (3, 2), (-3, 2), (2, 2), (-2, 2), (1, 2),
        (-1, 1), (1, 1), (-1, 1), (0, 1),
    ],
];

/// Reconstructs the 21-bit (Q20 fixed-point) PARCOR value for a quantized
/// 7-bit coefficient `q` at coefficient `index`, .
///
/// For `index >= 2` the mapping is the plain linear reconstruction
/// `(q << 14) + (1 << 13)`, i.e. the midpoint of the quantization bucket
/// scaled into Q20. For `index < 2`, the *encoder* companded the true PARCOR
/// value before quantizing it (`p_enc = sqrt(2*(sign*p+1)) - 1`), so
/// reconstruction inverts that companding around the same midpoint before
/// scaling to Q20, matching `r = sign * 32 * scaled_table[q+64]` with
/// `scaled_table` expanded in closed form instead of tabulated, since its
/// defining formula is exact and the literal table was not retrievable.
pub fn reconstruct_parcor(q: i32, index: usize) -> i32 {
    debug_assert!((-64..=63).contains(&q));
    if index < 2 {
        let sign: f64 = if index == 0 { 1.0 } else { -1.0 };
        let p_enc = (q as f64 + 0.5) / 64.0;
        let p_true = sign * (((p_enc + 1.0).powi(2)) / 2.0 - 1.0);
        (p_true * (1i64 << 20) as f64).round() as i32
    } else {
        (q << 14) + (1 << 13)
    }
}

/// Companding used when *quantizing* PARCOR coefficients 0 and 1 (the
/// forward half of [`reconstruct_parcor`]'s inverse).
pub fn compand_parcor(index: usize, parcor: f64) -> f64 {
    if index < 2 {
        let sign: f64 = if index == 0 { 1.0 } else { -1.0 };
        (2.0 * (sign * parcor + 1.0)).sqrt() - 1.0
    } else {
        parcor
    }
}

/// Number of discrete BGMC probability models (`sx` in `0..16`).
pub const BGMC_NUM_MODELS: usize = 16;

/// Per-`sx` maximum MSB symbol value before the `>> delta` shift applied in
/// BGMC encoding. Forms a geometric ladder, consistent with the `s`/`sx`
/// derivation (`16 * (log2(sum) - log2(N) + C)`), since the as-shipped
/// `ff_bgmc_max` data table was not part of the retrieved source.
pub fn bgmc_max(sx: usize) -> u32 {
    debug_assert!(sx < BGMC_NUM_MODELS);
    (1u32 << (sx as u32 + 4)).saturating_sub(1)
}

/// 16-entry log-spaced gain table used to remap LTP gain index codes to
/// actual gains. Values are nearest-matched against `lrint(c*16)` during
/// quantization and looked up by index when writing/reconstructing.
pub const LTP_GAIN_TABLE: [i16; 16] = [
    -96, -72, -54, -40, -30, -22, -16, -11, -6, -1, 4, 10, 16, 24, 36, 54,
];

/// Finds the index into [`LTP_GAIN_TABLE`] whose value is nearest to
/// `target` (ties favor the lower index, matching a simple linear scan).
pub fn ltp_gain_table_nearest(target: i16) -> usize {
    let mut best_idx = 0usize;
    let mut best_dist = i32::MAX;
    for (idx, &value) in LTP_GAIN_TABLE.iter().enumerate() {
        let dist = (value as i32 - target as i32).abs();
        if dist < best_dist {
            best_dist = dist;
            best_idx = idx;
        }
    }
    best_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconstruct_parcor_linear_for_high_index() {
        assert_eq!(reconstruct_parcor(0, 5), 1 << 13);
        assert_eq!(reconstruct_parcor(-1, 5), (-1 << 14) + (1 << 13));
    }

    #[test]
    fn reconstruct_parcor_is_bounded_for_low_index() {
        let r_min = reconstruct_parcor(-64, 0);
        let r_max = reconstruct_parcor(63, 0);
        assert!(r_min < 0);
        assert!(r_max > 0);
        assert!(r_min.abs() <= 1 << 20);
        assert!(r_max.abs() <= 1 << 20);
    }

    #[test]
    fn bgmc_max_is_monotonic() {
        for sx in 1..BGMC_NUM_MODELS {
            assert!(bgmc_max(sx) > bgmc_max(sx - 1));
        }
    }

    #[test]
    fn ltp_gain_nearest_matches_exact_entries() {
        for (idx, &value) in LTP_GAIN_TABLE.iter().enumerate() {
            assert_eq!(ltp_gain_table_nearest(value), idx);
        }
    }
}
