//! Top-level `Encoder`: ties configuration, per-channel history, the
//! frame driver, and `ALSSpecificConfig` header emission together.

use log::{debug, trace, warn};

use crate::bgmc::{BgmcSink, RangeCoder};
use crate::bitstream::BitWriter;
use crate::config::{CompressionLevel, RaFlag, SpecificConfig, StageTable};
use crate::crc::Crc32;
use crate::error::{AlsResult, Error};
use crate::frame;
use crate::sample::{self, DeinterleavedFrame, SampleFormat};
use crate::signal::HistoryView;

/// Magic 4-byte tag, `"ALS\0"`, that opens `ALSSpecificConfig`.
const ALS_MAGIC: u32 = 0x414C_5300;

/// The stream-level ALS encoder: owns per-channel sample history, the
/// random-access counter, the running CRC, and the resolved stage table
/// for the chosen compression level.
pub struct Encoder {
    config: SpecificConfig,
    stages: StageTable,
    sample_format: SampleFormat,
    history: Vec<Vec<i32>>,
    history_pad: usize,
    frame_index: u64,
    ra_counter: u8,
    crc: Crc32,
    samples_written: u64,
}

impl Encoder {
    /// Builds an encoder for `channels` channels at `sample_rate`, using
    /// `compression_level` (0, 1, or 2) to resolve the stage table and
    /// default `SpecificConfig` fields, then applying any caller overrides
    /// present in `config_override`.
    ///
    /// Validates `sample_format` and the resulting `SpecificConfig` up
    /// front: an `Encoder` cannot exist in an invalid state.
    pub fn new(
        channels: u16,
        sample_rate: u32,
        sample_format: SampleFormat,
        frame_length: u32,
        compression_level: u8,
        total_samples: Option<u32>,
    ) -> AlsResult<Encoder> {
        sample::validate_format(sample_format)?;
        if sample_format == SampleFormat::U8 {
            // u8 input is always accepted at the sample layer; floating
            // point is the only format this encoder refuses outright.
        }

        let level = CompressionLevel::from_u8(compression_level)?;
        let defaults = level.base_config();
        let stages = level.stage_table();

        let config = SpecificConfig {
            channels,
            sample_rate,
            total_samples,
            resolution: sample_format.resolution_code(),
            floating: false,
            msb_first: false,
            frame_length,
            ra_distance: 1,
            ra_flag: RaFlag::Frames,
            adapt_order: defaults.adapt_order,
            coef_table: 0,
            long_term_prediction: defaults.long_term_prediction,
            max_order: defaults.max_order,
            block_switching: defaults.block_switching,
            bgmc: defaults.bgmc,
            sb_part: defaults.sb_part,
            joint_stereo: defaults.joint_stereo,
            mc_coding: false,
            chan_config: false,
            chan_sort: false,
            crc_enabled: defaults.crc_enabled,
            rlslms: false,
        };
        config.validate()?;

        let history_pad = config.history_pad();
        let history = vec![vec![0i32; history_pad]; channels as usize];

        debug!(
            "als encoder ready: channels={} rate={} frame_length={} level={}",
            channels, sample_rate, frame_length, compression_level
        );

        Ok(Encoder {
            config,
            stages,
            sample_format,
            history,
            history_pad,
            frame_index: 0,
            ra_counter: 0,
            crc: Crc32::new(),
            samples_written: 0,
        })
    }

    /// Read-only access to the resolved stream configuration, e.g. for
    /// callers that need to inspect `max_rice_param` or `ltp_lag_bits`.
    pub fn config(&self) -> &SpecificConfig {
        &self.config
    }

    /// Encodes one frame of deinterleaved, already-normalized samples
    /// (input contract), appending channel history and returning the
    /// encoded bit packet.
    ///
    /// `frame.nb_samples` must be in `1..=frame_length`; a shorter final
    /// frame is accepted and its block-switching tree is truncated to the
    /// true remaining length.
    pub fn encode_frame(&mut self, input: &DeinterleavedFrame) -> AlsResult<Vec<u8>> {
        if input.channels.len() != self.config.channels as usize {
            return Err(Error::ChannelCountMismatch {
                expected: self.config.channels as usize,
                actual: input.channels.len(),
            });
        }
        if input.nb_samples > self.config.frame_length as usize {
            return Err(Error::FrameTooLong {
                actual: input.nb_samples,
                max: self.config.frame_length as usize,
            });
        }

        let ra_block = frame::is_ra_frame(self.frame_index, self.config.ra_distance);
        if ra_block {
            self.ra_counter = 0;
        }

        trace!(
            "frame {} ra_counter={} nb_samples={}",
            self.frame_index, self.ra_counter, input.nb_samples
        );

        let mut buffers: Vec<Vec<i32>> = Vec::with_capacity(self.config.channels as usize);
        for (ch, channel_samples) in input.channels.iter().enumerate() {
            let mut buf = Vec::with_capacity(self.history_pad + input.nb_samples);
            buf.extend_from_slice(&self.history[ch]);
            buf.extend_from_slice(channel_samples);
            buffers.push(buf);
        }

        let views: Vec<HistoryView> = buffers
            .iter()
            .map(|b| HistoryView::new(b, self.history_pad))
            .collect();

        let max_bits = (self.config.resolution.bits() as usize + 32) * input.nb_samples * self.config.channels as usize
            + 4096;
        let mut writer = BitWriter::new(max_bits);
        let mut coder: Box<dyn BgmcSink> = Box::new(RangeCoder::default());

        let result = frame::encode_frame(
            &mut writer,
            &views,
            input.nb_samples,
            &self.config,
            &self.stages,
            ra_block,
            coder.as_mut(),
        );

        // History and the running CRC advance regardless of whether this
        // frame's bitstream made it out:  requires the encoder to stay
        // in sync with what a decoder would reconstruct from surrounding
        // frames even when this one is dropped for an overflowing buffer.
        for (ch, channel_samples) in input.channels.iter().enumerate() {
            for &s in channel_samples.iter() {
                let bytes = match self.sample_format {
                    SampleFormat::U8 => vec![(s + 128) as u8],
                    SampleFormat::S16 => (s as i16).to_le_bytes().to_vec(),
                    SampleFormat::S24In32 | SampleFormat::S32 => s.to_le_bytes().to_vec(),
                };
                self.crc.update(&bytes);
            }
            self.history[ch] = tail(&buffers[ch], self.history_pad);
        }

        self.samples_written += input.nb_samples as u64;
        self.frame_index += 1;
        self.ra_counter = self.ra_counter.wrapping_add(1);
        if self.config.ra_distance > 0 {
            self.ra_counter %= self.config.ra_distance;
        }

        if let Err(err) = result {
            warn!("frame {} dropped: {}", self.frame_index, err);
            return Err(err);
        }

        let body = writer.into_inner()?;

        if matches!(self.config.ra_flag, RaFlag::Frames) && self.config.ra_distance == 1 {
            let mut framed = Vec::with_capacity(body.len() + 4);
            framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
            framed.extend_from_slice(&body);
            Ok(framed)
        } else {
            Ok(body)
        }
    }

    /// Emits the finalized `ALSSpecificConfig` header, bit-exact with
    /// the reference encoder's `write_specific_config`, to be stored as
    /// extradata/side-data alongside the encoded packets.
    pub fn write_specific_config(&self) -> AlsResult<Vec<u8>> {
        // Fixed-size header: a handful of 32-bit words plus under 80 bits
        // of packed flags/fields, always well under 512 bits total.
        let mut writer = BitWriter::new(512);

        writer.write_u32(ALS_MAGIC)?;
        writer.write_u32(self.config.sample_rate)?;
        writer.write_u32(self.config.total_samples.unwrap_or(0xFFFF_FFFF))?;
        writer.write_bits(self.config.channels as u32 - 1, 16)?;
        writer.write_bits(1, 3)?; // file_type: 1 = wav
        writer.write_bits(self.config.resolution.code() as u32, 3)?;
        writer.write_bits(self.config.floating as u32, 1)?;
        writer.write_bits(self.config.msb_first as u32, 1)?;
        writer.write_bits(self.config.frame_length - 1, 16)?;
        writer.write_bits(self.config.ra_distance as u32, 8)?;
        writer.write_bits(self.config.ra_flag as u32, 2)?;
        writer.write_bits(self.config.adapt_order as u32, 1)?;
        writer.write_bits(self.config.coef_table as u32, 2)?;
        writer.write_bits(self.config.long_term_prediction as u32, 1)?;
        writer.write_bits(self.config.max_order as u32, 10)?;
        writer.write_bits(self.config.block_switching_wire_value() as u32, 2)?;
        writer.write_bits(self.config.bgmc as u32, 1)?;
        writer.write_bits(self.config.sb_part as u32, 1)?;
        writer.write_bits(self.config.joint_stereo as u32, 1)?;
        writer.write_bits(self.config.mc_coding as u32, 1)?;
        writer.write_bits(self.config.chan_config as u32, 1)?;
        writer.write_bits(self.config.chan_sort as u32, 1)?;
        writer.write_bits(self.config.crc_enabled as u32, 1)?;
        writer.write_bits(self.config.rlslms as u32, 1)?;
        writer.write_bits(0, 5)?; // reserved
        writer.write_bits(0, 1)?; // aux_data_enabled
        writer.align_to_byte()?;

        writer.write_u32(0)?; // original header size
        writer.write_u32(0)?; // original trailer size
        if self.config.crc_enabled {
            writer.write_u32(self.crc.finalize_bitnegated())?;
        }

        writer.into_inner()
    }
}

/// The last `n` elements of `buf` (history carried forward for the next
/// frame).
fn tail(buf: &[i32], n: usize) -> Vec<i32> {
    if buf.len() <= n {
        let mut padded = vec![0i32; n - buf.len()];
        padded.extend_from_slice(buf);
        padded
    } else {
        buf[buf.len() - n..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_invalid_compression_level() {
        let result = Encoder::new(1, 48_000, SampleFormat::S16, 2048, 9, None);
        assert!(matches!(result, Err(Error::InvalidCompressionLevel(9))));
    }

    #[test]
    fn encode_frame_rejects_channel_mismatch() {
        let mut encoder = Encoder::new(2, 48_000, SampleFormat::S16, 256, 1, None).unwrap();
        let left = [0i32; 256];
        let chans: [&[i32]; 1] = [&left];
        let input = DeinterleavedFrame::new(&chans).unwrap();
        let result = encoder.encode_frame(&input);
        assert!(matches!(result, Err(Error::ChannelCountMismatch { expected: 2, actual: 1 })));
    }

    #[test]
    fn encode_frame_mono_roundtrip_produces_packet_and_advances_history() {
        let mut encoder = Encoder::new(1, 48_000, SampleFormat::S16, 256, 1, Some(256)).unwrap();
        let mut samples = [0i32; 256];
        for (i, s) in samples.iter_mut().enumerate() {
            *s = ((i as f64 * 0.2).sin() * 2000.0) as i32;
        }
        let chans: [&[i32]; 1] = [&samples];
        let input = DeinterleavedFrame::new(&chans).unwrap();
        let packet = encoder.encode_frame(&input).unwrap();
        assert!(!packet.is_empty());

        let config_bytes = encoder.write_specific_config().unwrap();
        assert_eq!(&config_bytes[0..4], b"ALS\0");
    }

    #[test]
    fn specific_config_header_round_trips_sample_rate() {
        let encoder = Encoder::new(2, 44_100, SampleFormat::S16, 4096, 2, Some(4096)).unwrap();
        let bytes = encoder.write_specific_config().unwrap();
        let rate = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(rate, 44_100);
    }
}
