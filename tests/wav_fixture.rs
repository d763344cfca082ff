//! Exercises the encoder against PCM decoded from an in-memory WAV file,
//! standing in for the container/demuxer layer this crate explicitly
//! treats as an external collaborator.

use alsenc::{DeinterleavedFrame, Encoder, SampleFormat};
use std::io::Cursor;

fn write_test_wav(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }
    buf
}

#[test]
fn wav_pcm_round_trips_through_the_sample_boundary() {
    let _ = env_logger::builder().is_test(true).try_init();

    let n = 2048;
    let samples: Vec<i16> = (0..n)
        .map(|i| ((i as f64 * 0.15).sin() * 9000.0) as i16)
        .collect();
    let wav_bytes = write_test_wav(&samples, 1, 48_000);

    let mut reader = hound::WavReader::new(Cursor::new(wav_bytes)).unwrap();
    let decoded: Vec<i32> = reader
        .samples::<i16>()
        .map(|s| s.unwrap() as i32)
        .collect();
    assert_eq!(decoded.len(), n);

    let mut encoder = Encoder::new(1, 48_000, SampleFormat::S16, n as u32, 1, Some(n as u32)).unwrap();
    let chans: [&[i32]; 1] = [&decoded];
    let input = DeinterleavedFrame::new(&chans).unwrap();
    let packet = encoder.encode_frame(&input).unwrap();
    assert!(!packet.is_empty());
}
