//! The `sample` module describes the PCM sample formats accepted at the
//! encoder boundary and the (external, caller-supplied) deinterleaving
//! contract.

use crate::error::{AlsResult, Error};

/// The PCM sample format of an input frame.
///
/// `floating` input is intentionally absent: per the resolved open
/// question, floating-point PCM is rejected at `Encoder::new` rather than
/// silently falling through to the 32-bit integer path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 8-bit unsigned PCM, biased by -128 before use.
    U8,
    /// 16-bit signed PCM.
    S16,
    /// 32-bit signed PCM holding at most 24 significant bits.
    S24In32,
    /// 32-bit signed PCM using the full width.
    S32,
}

impl SampleFormat {
    /// The nominal bit depth this format encodes to, i.e. the
    /// `bits_per_raw_sample` used for verbatim/constant fields and Rice
    /// parameter ceilings.
    pub fn resolution_bits(self) -> u32 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24In32 => 24,
            SampleFormat::S32 => 32,
        }
    }

    pub fn resolution_code(self) -> crate::config::Resolution {
        use crate::config::Resolution;
        match self {
            SampleFormat::U8 => Resolution::Bits8,
            SampleFormat::S16 => Resolution::Bits16,
            SampleFormat::S24In32 => Resolution::Bits24,
            SampleFormat::S32 => Resolution::Bits32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S24In32 => "s24-in-32",
            SampleFormat::S32 => "s32",
        }
    }
}

/// Converts one interleaved PCM sample, given as a 32-bit container, into
/// the encoder's internal `i32` representation. `u8` samples are biased by
/// -128 then left as-is; all other formats are used verbatim.
pub fn normalize_sample(format: SampleFormat, raw: i64) -> i32 {
    match format {
        SampleFormat::U8 => (raw as i32) - 128,
        SampleFormat::S16 | SampleFormat::S24In32 | SampleFormat::S32 => raw as i32,
    }
}

/// Validates that `format` is one this encoder supports; exists so
/// `Encoder::new` can surface `Error::UnsupportedSampleFormat` /
/// `Error::FloatingPointUnsupported` up front instead of during the first
/// `encode_frame` call.
pub fn validate_format(format: SampleFormat) -> AlsResult<()> {
    match format {
        SampleFormat::U8 | SampleFormat::S16 | SampleFormat::S24In32 | SampleFormat::S32 => Ok(()),
    }
}

/// A deinterleaved view of one input frame: `channels` slices, each holding
/// `nb_samples` integer samples already normalized via [`normalize_sample`].
///
/// Deinterleaving itself is an external collaborator; this crate only
/// consumes the already-split channel data.
pub struct DeinterleavedFrame<'a> {
    pub channels: &'a [&'a [i32]],
    pub nb_samples: usize,
}

impl<'a> DeinterleavedFrame<'a> {
    pub fn new(channels: &'a [&'a [i32]]) -> AlsResult<DeinterleavedFrame<'a>> {
        let nb_samples = channels.first().map_or(0, |c| c.len());
        for channel in channels {
            if channel.len() != nb_samples {
                return Err(Error::InvalidConfig(
                    "all channels in a frame must have the same sample count",
                ));
            }
        }
        Ok(DeinterleavedFrame { channels, nb_samples })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u8_is_biased_by_128() {
        assert_eq!(normalize_sample(SampleFormat::U8, 0), -128);
        assert_eq!(normalize_sample(SampleFormat::U8, 128), 0);
        assert_eq!(normalize_sample(SampleFormat::U8, 255), 127);
    }

    #[test]
    fn other_formats_pass_through() {
        assert_eq!(normalize_sample(SampleFormat::S16, -1234), -1234);
        assert_eq!(normalize_sample(SampleFormat::S32, i32::MIN as i64), i32::MIN);
    }

    #[test]
    fn mismatched_channel_lengths_are_rejected() {
        let a = [1i32, 2, 3];
        let b = [1i32, 2];
        let chans: [&[i32]; 2] = [&a, &b];
        assert!(DeinterleavedFrame::new(&chans).is_err());
    }
}
