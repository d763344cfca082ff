//! Crate-wide error type.
//!
//! The split mirrors the reference encoder's failure surface: configuration
//! errors prevent an [`crate::Encoder`] from being constructed at all, while
//! `BitstreamOverflow` is the one failure that can occur mid-stream, and is
//! always recoverable by the caller (enlarge the buffer and retry, or drop
//! the frame).

use thiserror::Error;

/// Errors that can occur while configuring or driving the ALS encoder.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// The requested PCM sample format is not one this encoder supports.
    #[error("unsupported sample format: {0}")]
    UnsupportedSampleFormat(&'static str),

    /// Floating-point PCM input was requested; this encoder only implements
    /// the integer PCM path.
    #[error("floating-point sample input is not implemented")]
    FloatingPointUnsupported,

    /// The compression level must be 0, 1, or 2.
    #[error("invalid compression level: {0} (expected 0..=2)")]
    InvalidCompressionLevel(u8),

    /// A `SpecificConfig` field was outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// The caller-supplied output buffer was too small to hold the encoded
    /// block or frame. The encoder's state (sample history, RA counter, CRC)
    /// is left coherent for the next frame; the caller should enlarge its
    /// buffer and retry, or treat this frame as lost.
    #[error("bitstream buffer overflow: attempted to write past the end of the output buffer")]
    BitstreamOverflow,

    /// A frame was presented with a channel count that does not match the
    /// encoder's configured channel count.
    #[error("channel count mismatch: encoder configured for {expected}, frame supplied {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },

    /// A frame was presented with more samples per channel than `frame_length`.
    #[error("frame too long: {actual} samples exceeds frame_length {max}")]
    FrameTooLong { actual: usize, max: usize },
}

/// Either `T` on success, or an `Error` on failure.
pub type AlsResult<T> = std::result::Result<T, Error>;
