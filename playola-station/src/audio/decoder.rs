//! Audio decoder using symphonia
//!
//! Probes and decodes the formats the station serves (MP3, AAC/M4A, FLAC,
//! Vorbis, WAV) to interleaved stereo f32.

use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Stream parameters read from the container without decoding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Unknown for some streams (e.g. raw MP3 without a Xing header)
    pub duration: Option<Duration>,
}

/// Fully decoded audio, interleaved stereo
#[derive(Debug, Clone, Default)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Frame index at `offset`, clamped to the end of the audio
    pub fn frame_at(&self, offset: Duration) -> usize {
        let frame = (offset.as_secs_f64() * self.sample_rate as f64) as usize;
        frame.min(self.frames())
    }
}

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
}

/// Stateless symphonia front end
pub struct AudioDecoder;

impl AudioDecoder {
    fn open(path: &Path) -> Result<OpenedTrack> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe {}: {}", path.display(), e)))?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode(format!("No audio track in {}", path.display())))?;

        Ok(OpenedTrack {
            track_id: track.id,
            params: track.codec_params.clone(),
            format,
        })
    }

    /// Read stream parameters without decoding
    pub fn probe(path: &Path) -> Result<AudioInfo> {
        let opened = Self::open(path)?;
        let params = &opened.params;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let duration = params.n_frames.map(|frames| match params.time_base {
            Some(tb) => {
                let time = tb.calc_time(frames);
                Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac)
            }
            None => Duration::from_secs_f64(frames as f64 / sample_rate as f64),
        });

        Ok(AudioInfo {
            sample_rate,
            channels,
            duration,
        })
    }

    /// Decode the whole file
    ///
    /// Mono sources are duplicated to both channels; sources with more than
    /// two channels keep the first two.
    pub fn decode(path: &Path) -> Result<DecodedAudio> {
        debug!("Decoding {}", path.display());
        let mut opened = Self::open(path)?;

        let sample_rate = opened
            .params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let mut decoder: Box<dyn Decoder> = symphonia::default::get_codecs()
            .make(&opened.params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut samples = Vec::new();
        let mut scratch: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match opened.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                Err(e) => {
                    warn!("Error reading packet from {}: {}", path.display(), e);
                    break;
                }
            };

            if packet.track_id() != opened.track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let too_small = scratch
                .as_ref()
                .map_or(true, |buf| buf.capacity() < decoded.capacity() * channels);
            if too_small {
                scratch = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
            }
            if let Some(buffer) = scratch.as_mut() {
                buffer.copy_interleaved_ref(decoded);
                push_stereo(buffer.samples(), channels, &mut samples);
            }
        }

        debug!(
            "Decoded {} frames at {} Hz from {}",
            samples.len() / 2,
            sample_rate,
            path.display()
        );

        Ok(DecodedAudio {
            samples,
            sample_rate,
        })
    }
}

/// Append interleaved `channels`-wide frames to `out` as stereo
fn push_stereo(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    match channels {
        0 => {}
        1 => {
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        _ => {
            for frame in interleaved.chunks_exact(channels) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}
