//! Voice mixer for device output
//!
//! Each player-bank slot is one voice. The output callback pulls frames from
//! every playing voice, applies the voice volume and sums them, so an
//! outgoing crossfade and the incoming spin render concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::decoder::DecodedAudio;

struct Voice {
    audio: Arc<DecodedAudio>,
    /// Position in source frames
    cursor: f64,
    /// Source frames advanced per output frame
    step: f64,
    volume: f32,
    playing: bool,
}

pub struct Mixer {
    output_rate: u32,
    voices: HashMap<usize, Voice>,
}

impl Mixer {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate: output_rate.max(1),
            voices: HashMap::new(),
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn set_output_rate(&mut self, rate: u32) {
        self.output_rate = rate.max(1);
        for voice in self.voices.values_mut() {
            voice.step = voice.audio.sample_rate as f64 / self.output_rate as f64;
        }
    }

    pub fn load(&mut self, slot: usize, audio: Arc<DecodedAudio>) {
        let step = audio.sample_rate as f64 / self.output_rate as f64;
        self.voices.insert(
            slot,
            Voice {
                audio,
                cursor: 0.0,
                step,
                volume: 1.0,
                playing: false,
            },
        );
    }

    /// Start a loaded voice; false if the slot is empty
    pub fn play(&mut self, slot: usize, offset: Duration) -> bool {
        match self.voices.get_mut(&slot) {
            Some(voice) => {
                voice.cursor = voice.audio.frame_at(offset) as f64;
                voice.playing = true;
                true
            }
            None => false,
        }
    }

    pub fn set_volume(&mut self, slot: usize, volume: f32) {
        if let Some(voice) = self.voices.get_mut(&slot) {
            voice.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn remove(&mut self, slot: usize) {
        self.voices.remove(&slot);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.values().filter(|v| v.playing).count()
    }

    /// Fill `out` (interleaved, `channels` wide) with the mix of all playing voices
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        for voice in self.voices.values_mut().filter(|v| v.playing) {
            let frames = voice.audio.frames();
            for frame in out.chunks_mut(channels) {
                let idx = voice.cursor as usize;
                if idx >= frames {
                    voice.playing = false;
                    break;
                }
                let left = voice.audio.samples[idx * 2] * voice.volume;
                let right = voice.audio.samples[idx * 2 + 1] * voice.volume;
                frame[0] += left;
                if channels > 1 {
                    frame[1] += right;
                }
                voice.cursor += voice.step;
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}
