//! Audio output using cpal
//!
//! `cpal::Stream` is not `Send`, so the stream lives on a dedicated audio
//! thread for the backend's whole life. The backend talks to it only
//! through the shared [`Mixer`].

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::backend::AudioBackend;
use super::decoder::{AudioDecoder, AudioInfo};
use super::mixer::Mixer;
use crate::error::{Error, Result};

/// Backend rendering every slot through the system output device
pub struct DeviceBackend {
    mixer: Arc<Mutex<Mixer>>,
    error_flag: Arc<AtomicBool>,
    shutdown: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceBackend {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the named device (or the default) and start the output stream
    ///
    /// Falls back to the default device when the named one is missing.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let mixer = Arc::new(Mutex::new(Mixer::new(44_100)));
        let error_flag = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_mixer = Arc::clone(&mixer);
        let thread_flag = Arc::clone(&error_flag);
        let thread = std::thread::Builder::new()
            .name("playola-audio".to_string())
            .spawn(move || match start_stream(device_name, thread_mixer, thread_flag) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    // Blocks until the backend is dropped
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        Ok(Self {
            mixer,
            error_flag,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// True once the stream has reported an error
    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }
}

impl AudioBackend for DeviceBackend {
    fn load(&mut self, slot: usize, path: &Path) -> Result<AudioInfo> {
        let info = AudioDecoder::probe(path)?;
        let audio = AudioDecoder::decode(path)?;
        self.mixer.lock().load(slot, Arc::new(audio));
        Ok(info)
    }

    fn play(&mut self, slot: usize, offset: Duration) -> Result<()> {
        if self.has_error() {
            return Err(Error::AudioOutput("Output stream reported an error".to_string()));
        }
        if self.mixer.lock().play(slot, offset) {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("slot {} has nothing loaded", slot)))
        }
    }

    fn set_volume(&mut self, slot: usize, volume: f32) {
        self.mixer.lock().set_volume(slot, volume);
    }

    fn stop(&mut self, slot: usize) {
        self.mixer.lock().remove(slot);
    }
}

impl Drop for DeviceBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn select_device(device_name: Option<&str>) -> Result<Device> {
    let host = cpal::default_host();

    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;
        if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Using requested audio device: {}", name);
            return Ok(dev);
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let dev = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    info!(
        "Using default audio device: {}",
        dev.name().unwrap_or_else(|_| "Unknown".to_string())
    );
    Ok(dev)
}

/// Prefer 44.1kHz stereo f32, else the device default
fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

    if let Some(preferred) = supported.find(|c| {
        c.channels() == 2
            && c.min_sample_rate().0 <= 44_100
            && c.max_sample_rate().0 >= 44_100
            && c.sample_format() == SampleFormat::F32
    }) {
        let format = preferred.sample_format();
        return Ok((preferred.with_sample_rate(cpal::SampleRate(44_100)).config(), format));
    }

    let default = device
        .default_output_config()
        .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
    Ok((default.config(), default.sample_format()))
}

fn start_stream(
    device_name: Option<String>,
    mixer: Arc<Mutex<Mixer>>,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream> {
    let device = select_device(device_name.as_deref())?;
    let (config, format) = best_config(&device)?;
    mixer.lock().set_output_rate(config.sample_rate.0);
    debug!(
        "Audio config: sample_rate={}, channels={}, format={:?}",
        config.sample_rate.0, config.channels, format
    );

    let stream = match format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, error_flag)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, error_flag)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, error_flag)?,
        other => {
            return Err(Error::AudioOutput(format!("Unsupported sample format: {:?}", other)));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
    info!("Audio stream started");
    Ok(stream)
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
    error_flag: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mixer.lock().render(&mut scratch, channels);
                for (out, sample) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}
