//! Stream-global configuration: `SpecificConfig`, compression levels, and
//! the per-stage algorithm-selection tables they expand into.
//!
//! Grounded directly in the reference encoder's `spc_config_c{0,1,2}` /
//! `stage_{js,bs,final}_c{0,1,2}` static tables.

use crate::error::{AlsResult, Error};

/// Sample resolution codes used throughout the bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Bits8 = 0,
    Bits16 = 1,
    Bits24 = 2,
    Bits32 = 3,
}

impl Resolution {
    pub fn bits(self) -> u32 {
        match self {
            Resolution::Bits8 => 8,
            Resolution::Bits16 => 16,
            Resolution::Bits24 => 24,
            Resolution::Bits32 => 32,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// When the per-frame random-access flag is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaFlag {
    /// No RA distance; never random-access.
    None = 0,
    /// RA unit sizes are stored in the header.
    Header = 1,
    /// RA unit sizes are prefixed to each frame.
    Frames = 2,
}

/// Stream-global, immutable-after-init configuration (`SpecificConfig`).
#[derive(Debug, Clone)]
pub struct SpecificConfig {
    pub channels: u16,
    pub sample_rate: u32,
    /// Total sample count, or `None` for "unknown" (wire sentinel `0xFFFFFFFF`).
    pub total_samples: Option<u32>,
    pub resolution: Resolution,
    pub floating: bool,
    pub msb_first: bool,
    pub frame_length: u32,
    pub ra_distance: u8,
    pub ra_flag: RaFlag,
    pub adapt_order: bool,
    pub coef_table: u8,
    pub long_term_prediction: bool,
    pub max_order: u16,
    /// Block-switching depth, 0..=5.
    pub block_switching: u8,
    pub bgmc: bool,
    pub sb_part: bool,
    pub joint_stereo: bool,
    pub mc_coding: bool,
    pub chan_config: bool,
    pub chan_sort: bool,
    pub crc_enabled: bool,
    pub rlslms: bool,
}

impl SpecificConfig {
    /// Validates every field's range: an out-of-range configuration can
    /// never produce an `Encoder`.
    pub fn validate(&self) -> AlsResult<()> {
        if self.channels == 0 {
            return Err(Error::InvalidConfig("channels must be at least 1"));
        }
        if self.frame_length == 0 || self.frame_length > 65536 {
            return Err(Error::InvalidConfig("frame_length must be in 1..=65536"));
        }
        if self.max_order > 1023 {
            return Err(Error::InvalidConfig("max_order must be in 0..=1023"));
        }
        if self.block_switching > 5 {
            return Err(Error::InvalidConfig("block_switching must be in 0..=5"));
        }
        if self.coef_table > 3 {
            return Err(Error::InvalidConfig("coef_table must be in 0..=3"));
        }
        if self.floating {
            return Err(Error::InvalidConfig(
                "floating-point sample input is not implemented",
            ));
        }
        if self.mc_coding && self.channels > 2 {
            return Err(Error::InvalidConfig(
                "multi-channel (>2) correlation coding (mc_coding) is not implemented",
            ));
        }
        Ok(())
    }

    /// `history_pad`: how many samples of the previous frame are carried
    /// into each per-channel sample stream.
    pub fn history_pad(&self) -> usize {
        (self.max_order as usize).max(crate::ltp::LTP_MAX_LAG)
    }

    /// The ALSSpecificConfig `block_switching` wire field: zero when
    /// disabled, otherwise `max(1, depth - 2)`.
    pub fn block_switching_wire_value(&self) -> u8 {
        if self.block_switching == 0 {
            0
        } else {
            self.block_switching.saturating_sub(2).max(1)
        }
    }

    /// Maximum Rice parameter, which depends on sample resolution.
    pub fn max_rice_param(&self) -> u8 {
        if self.resolution.bits() > 16 {
            31
        } else {
            15
        }
    }

    /// Bit width of the LTP lag field, which depends on sample rate.
    pub fn ltp_lag_bits(&self) -> u8 {
        8 + (self.sample_rate >= 96_000) as u8 + (self.sample_rate >= 192_000) as u8
    }
}

/// One of the three closed compression levels exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
}

impl CompressionLevel {
    pub fn from_u8(level: u8) -> AlsResult<CompressionLevel> {
        match level {
            0 => Ok(CompressionLevel::Level0),
            1 => Ok(CompressionLevel::Level1),
            2 => Ok(CompressionLevel::Level2),
            other => Err(Error::InvalidCompressionLevel(other)),
        }
    }

    /// The global config fields this compression level fixes ('s
    /// `(adapt_order, LTP, max_order, block_switching, bgmc, sb_part,
    /// joint_stereo, crc)` table).
    pub fn base_config(self) -> CompressionLevelDefaults {
        match self {
            CompressionLevel::Level0 => CompressionLevelDefaults {
                adapt_order: false,
                long_term_prediction: false,
                max_order: 4,
                block_switching: 0,
                bgmc: false,
                sb_part: false,
                joint_stereo: false,
                crc_enabled: false,
            },
            CompressionLevel::Level1 => CompressionLevelDefaults {
                adapt_order: false,
                long_term_prediction: false,
                max_order: 10,
                block_switching: 0,
                bgmc: false,
                sb_part: true,
                joint_stereo: true,
                crc_enabled: true,
            },
            CompressionLevel::Level2 => CompressionLevelDefaults {
                adapt_order: true,
                long_term_prediction: true,
                max_order: 32,
                block_switching: 1,
                bgmc: true,
                sb_part: true,
                joint_stereo: true,
                crc_enabled: true,
            },
        }
    }

    /// The three per-stage algorithm-selection tables for this
    /// compression level.
    pub fn stage_table(self) -> StageTable {
        match self {
            CompressionLevel::Level0 => StageTable {
                joint_stereo: StageOptions {
                    check_constant: false,
                    check_lsbs: false,
                    max_order: 0,
                    ec_sub: EcSubAlgorithm::RiceEstimate,
                    ec_param: EcParamAlgorithm::RiceEstimate,
                    ec_bit_count: EcBitCountAlgorithm::Estimate,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Fixed,
                    merge: BsMergeAlgorithm::BottomUp,
                },
                block_switching: StageOptions {
                    check_constant: false,
                    check_lsbs: false,
                    max_order: 4,
                    ec_sub: EcSubAlgorithm::RiceEstimate,
                    ec_param: EcParamAlgorithm::RiceEstimate,
                    ec_bit_count: EcBitCountAlgorithm::Estimate,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Fixed,
                    merge: BsMergeAlgorithm::BottomUp,
                },
                final_stage: StageOptions {
                    check_constant: false,
                    check_lsbs: false,
                    max_order: 4,
                    ec_sub: EcSubAlgorithm::RiceEstimate,
                    ec_param: EcParamAlgorithm::RiceEstimate,
                    ec_bit_count: EcBitCountAlgorithm::Estimate,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Fixed,
                    merge: BsMergeAlgorithm::BottomUp,
                },
            },
            CompressionLevel::Level1 => StageTable {
                joint_stereo: StageOptions {
                    check_constant: true,
                    check_lsbs: true,
                    max_order: 5,
                    ec_sub: EcSubAlgorithm::RiceEstimate,
                    ec_param: EcParamAlgorithm::RiceEstimate,
                    ec_bit_count: EcBitCountAlgorithm::Exact,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Fixed,
                    merge: BsMergeAlgorithm::FullSearch,
                },
                block_switching: StageOptions {
                    check_constant: true,
                    check_lsbs: true,
                    max_order: 10,
                    ec_sub: EcSubAlgorithm::RiceExact,
                    ec_param: EcParamAlgorithm::RiceExact,
                    ec_bit_count: EcBitCountAlgorithm::Exact,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Fixed,
                    merge: BsMergeAlgorithm::FullSearch,
                },
                final_stage: StageOptions {
                    check_constant: true,
                    check_lsbs: true,
                    max_order: 10,
                    ec_sub: EcSubAlgorithm::RiceExact,
                    ec_param: EcParamAlgorithm::RiceExact,
                    ec_bit_count: EcBitCountAlgorithm::Exact,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Fixed,
                    merge: BsMergeAlgorithm::FullSearch,
                },
            },
            CompressionLevel::Level2 => StageTable {
                joint_stereo: StageOptions {
                    check_constant: true,
                    check_lsbs: true,
                    max_order: 32,
                    ec_sub: EcSubAlgorithm::BgmcExact,
                    ec_param: EcParamAlgorithm::BgmcEstimate,
                    ec_bit_count: EcBitCountAlgorithm::Exact,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Cholesky,
                    merge: BsMergeAlgorithm::FullSearch,
                },
                block_switching: StageOptions {
                    check_constant: true,
                    check_lsbs: true,
                    max_order: 32,
                    ec_sub: EcSubAlgorithm::BgmcExact,
                    ec_param: EcParamAlgorithm::BgmcEstimate,
                    ec_bit_count: EcBitCountAlgorithm::Exact,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Cholesky,
                    merge: BsMergeAlgorithm::FullSearch,
                },
                final_stage: StageOptions {
                    check_constant: true,
                    check_lsbs: true,
                    max_order: 32,
                    ec_sub: EcSubAlgorithm::BgmcExact,
                    ec_param: EcParamAlgorithm::BgmcExact,
                    ec_bit_count: EcBitCountAlgorithm::Exact,
                    adapt_search: AdaptSearchAlgorithm::ValleyDetect,
                    ltp_coeff: LtpCoeffAlgorithm::Cholesky,
                    merge: BsMergeAlgorithm::FullSearch,
                },
            },
        }
    }
}

/// Global config fields a compression level fixes, before user overrides.
pub struct CompressionLevelDefaults {
    pub adapt_order: bool,
    pub long_term_prediction: bool,
    pub max_order: u16,
    pub block_switching: u8,
    pub bgmc: bool,
    pub sb_part: bool,
    pub joint_stereo: bool,
    pub crc_enabled: bool,
}

/// The three algorithmic stages of entropy parameter search: joint-stereo
/// analysis, block-switching search, and final encoding.
#[derive(Debug, Clone)]
pub struct StageTable {
    pub joint_stereo: StageOptions,
    pub block_switching: StageOptions,
    pub final_stage: StageOptions,
}

/// Per-stage options. Each stage independently chooses estimate vs exact
/// counting, Rice vs BGMC, and full vs valley-detect order search.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    pub check_constant: bool,
    pub check_lsbs: bool,
    pub max_order: u16,
    pub ec_sub: EcSubAlgorithm,
    pub ec_param: EcParamAlgorithm,
    pub ec_bit_count: EcBitCountAlgorithm,
    pub adapt_search: AdaptSearchAlgorithm,
    pub ltp_coeff: LtpCoeffAlgorithm,
    pub merge: BsMergeAlgorithm,
}

/// Determines entropy coding sub-block partitioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcSubAlgorithm {
    RiceEstimate,
    RiceExact,
    BgmcExact,
}

/// Determines per-sub-block Rice/BGMC parameter search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcParamAlgorithm {
    RiceEstimate,
    RiceExact,
    BgmcEstimate,
    BgmcExact,
}

/// Whether entropy bit counts are estimated or computed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcBitCountAlgorithm {
    Estimate,
    Exact,
}

/// Adaptive LPC order search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptSearchAlgorithm {
    ValleyDetect,
    Full,
}

/// LTP coefficient estimation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LtpCoeffAlgorithm {
    Fixed,
    Cholesky,
}

/// Block partitioner subtree-merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsMergeAlgorithm {
    BottomUp,
    FullSearch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_levels_match_table() {
        let c0 = CompressionLevel::Level0.base_config();
        assert_eq!(c0.max_order, 4);
        assert!(!c0.joint_stereo);
        let c2 = CompressionLevel::Level2.base_config();
        assert_eq!(c2.max_order, 32);
        assert!(c2.bgmc);
        assert!(c2.long_term_prediction);
    }

    #[test]
    fn block_switching_wire_value_matches_spec() {
        let mut cfg = sample_config();
        cfg.block_switching = 0;
        assert_eq!(cfg.block_switching_wire_value(), 0);
        cfg.block_switching = 1;
        assert_eq!(cfg.block_switching_wire_value(), 1);
        cfg.block_switching = 5;
        assert_eq!(cfg.block_switching_wire_value(), 3);
    }

    fn sample_config() -> SpecificConfig {
        SpecificConfig {
            channels: 2,
            sample_rate: 48_000,
            total_samples: Some(4096),
            resolution: Resolution::Bits16,
            floating: false,
            msb_first: false,
            frame_length: 4096,
            ra_distance: 1,
            ra_flag: RaFlag::Frames,
            adapt_order: false,
            coef_table: 0,
            long_term_prediction: false,
            max_order: 10,
            block_switching: 0,
            bgmc: false,
            sb_part: true,
            joint_stereo: true,
            mc_coding: false,
            chan_config: false,
            chan_sort: false,
            crc_enabled: true,
            rlslms: false,
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let mut cfg = sample_config();
        cfg.frame_length = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn floating_point_rejected_at_validate() {
        let mut cfg = sample_config();
        cfg.floating = true;
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidConfig(
                "floating-point sample input is not implemented"
            ))
        );
    }
}
