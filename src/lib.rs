//! An MPEG-4 ALS (Audio Lossless Coding) encoder core.
//!
//! This crate implements the per-frame compression pipeline that turns
//! integer PCM into a bit-exact ALS bitstream: adaptive block-switching,
//! PARCOR/LPC short-term prediction, long-term prediction, joint-stereo
//! difference coding, and Rice/BGMC entropy coding. PCM file I/O,
//! container muxing, and sample deinterleaving are external concerns; see
//! [`sample::DeinterleavedFrame`] for the boundary this crate consumes.
//!
//! The entry point is [`encoder::Encoder`].

pub mod bgmc;
pub mod bitstream;
pub mod block;
pub mod config;
pub mod crc;
pub mod encoder;
pub mod entropy;
pub mod error;
pub mod frame;
pub mod lpc;
pub mod ltp;
pub mod partition;
pub mod sample;
pub mod signal;
pub mod tables;

pub use config::{CompressionLevel, RaFlag, Resolution, SpecificConfig};
pub use encoder::Encoder;
pub use error::{AlsResult, Error};
pub use sample::{DeinterleavedFrame, SampleFormat};
