//! Audio test file generation
//!
//! Deterministic WAV files for decoder and backend tests, written to disk
//! or kept in memory for serving through a fake transport.

use std::f32::consts::PI;
use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{WavSpec, WavWriter};

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

fn stereo_spec() -> WavSpec {
    WavSpec {
        channels: 2,
        sample_rate: TEST_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

fn write_sine<W: Write + Seek>(
    writer: &mut WavWriter<W>,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let total_frames = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000;
    let amplitude_i16 = (amplitude * i16::MAX as f32) as i16;

    for frame_idx in 0..total_frames {
        let t = frame_idx as f32 / TEST_SAMPLE_RATE as f32;
        let sample = ((2.0 * PI * frequency_hz * t).sin() * amplitude_i16 as f32) as i16;
        writer.write_sample(sample)?;
        writer.write_sample(sample)?;
    }
    Ok(())
}

/// Generate silent stereo WAV file
pub fn generate_silent_wav<P: AsRef<Path>>(path: P, duration_ms: u64) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, stereo_spec())?;
    let total_samples = (TEST_SAMPLE_RATE as u64 * duration_ms) / 1000 * 2;
    for _ in 0..total_samples {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}

/// Generate sine wave stereo WAV file
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let mut writer = WavWriter::create(path, stereo_spec())?;
    write_sine(&mut writer, duration_ms, frequency_hz, amplitude)?;
    writer.finalize()
}

/// In-memory 440 Hz sine WAV, for serving as a download body
pub fn sine_wav_bytes(duration_ms: u64) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, stereo_spec()).expect("wav header");
        write_sine(&mut writer, duration_ms, 440.0, 0.5).expect("wav samples");
        writer.finalize().expect("wav finalize");
    }
    cursor.into_inner()
}
