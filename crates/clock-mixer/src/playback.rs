//! Output device lifecycle and the real-time render callback.
//!
//! [`OutputDevice::open`] selects a device, builds a CPAL output stream whose
//! callback renders the shared [`Mixer`], and starts it. The callback:
//! - renders the mixer into an `f32` scratch buffer (advancing the device clock)
//! - records the callback-to-playback latency reported by CPAL
//! - converts `f32` samples to the device sample format
//!
//! Dropping (or [`OutputDevice::close`]-ing) the device stops the stream.

use std::sync::MutexGuard;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};

use crate::config::OutputConfig;
use crate::device;
use crate::error::MixerError;
use crate::mixer::{Mixer, SharedMixer};

/// An open output stream rendering a [`Mixer`].
pub struct OutputDevice {
    name: String,
    frequency: u32,
    channels: u16,
    sample_format: cpal::SampleFormat,
    mixer: SharedMixer,
    stream: cpal::Stream,
}

impl OutputDevice {
    /// Open the device matching `needle` (or the default) and start rendering.
    pub fn open(host: &cpal::Host, needle: Option<&str>, cfg: &OutputConfig) -> Result<Self> {
        let device = device::pick_device(host, needle)?;
        let name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let config = device::pick_output_config(&device, cfg.target_rate)?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config, cfg.update_frames) {
            stream_config.buffer_size = buf;
        }
        let update_size = match stream_config.buffer_size {
            cpal::BufferSize::Fixed(frames) => frames,
            cpal::BufferSize::Default => 0,
        };

        let mixer = Mixer::shared(stream_config.sample_rate, update_size);
        let stream =
            build_output_stream(&device, &stream_config, config.sample_format(), &mixer)?;
        stream.play().context("start output stream")?;

        tracing::info!(
            device = %name,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            sample_format = ?config.sample_format(),
            buffer_size = ?stream_config.buffer_size,
            "output device opened"
        );

        Ok(Self {
            name,
            frequency: stream_config.sample_rate,
            channels: stream_config.channels,
            sample_format: config.sample_format(),
            mixer,
            stream,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Device sample rate in Hz; buffers must be uploaded at this rate.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_format(&self) -> cpal::SampleFormat {
        self.sample_format
    }

    /// Shared handle to the mixer rendered by this device.
    pub fn mixer(&self) -> &SharedMixer {
        &self.mixer
    }

    /// Lock the mixer for a group of calls.
    pub fn lock(&self) -> Result<MutexGuard<'_, Mixer>> {
        lock_mixer(&self.mixer)
    }

    /// Stop the stream and release the device.
    pub fn close(self) {
        if let Err(e) = self.stream.pause() {
            tracing::warn!("stream pause on close failed: {e}");
        }
        tracing::info!(device = %self.name, "output device closed");
    }
}

/// Lock a shared mixer, turning a poisoned lock into an error.
pub fn lock_mixer(mixer: &SharedMixer) -> Result<MutexGuard<'_, Mixer>> {
    mixer.lock().map_err(|_| anyhow!("mixer lock poisoned"))
}

/// Build a CPAL output stream that renders `mixer`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    mixer: &SharedMixer,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, mixer),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, mixer),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, mixer),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, mixer),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: &SharedMixer,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mixer_cb = mixer.clone();
    let mixer_err = mixer.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if let Ok(mut m) = mixer_err.lock() {
            m.record_error(MixerError::Stream(err.to_string()));
        }
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                match mixer_cb.lock() {
                    Ok(mut m) => {
                        let ts = info.timestamp();
                        if let Some(latency) = ts.playback.duration_since(&ts.callback) {
                            m.set_latency(latency);
                        }
                        m.render(&mut scratch, channels);
                    }
                    // Mixer is gone; keep the device fed with silence.
                    Err(_) => scratch.fill(0.0),
                }
                for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                    *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
                }
            },
            err_fn,
            None,
        )
        .context("build output stream")?;

    Ok(stream)
}
