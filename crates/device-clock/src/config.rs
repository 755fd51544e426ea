//! Demo configuration: defaults, optional TOML file, CLI overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clock_mixer::wave::{BUFFER_FRAMES, WAVE_HALF_PERIOD};
use serde::Deserialize;

/// Default delay between clock polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Largest accepted square wave buffer (256 MiB of `f32` samples).
pub const MAX_BUFFER_FRAMES: usize = 1 << 26;

/// One layer of optional settings (a TOML file or the CLI flags).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Output device substring match.
    pub device: Option<String>,
    /// Square wave half period in frames.
    pub half_period: Option<usize>,
    /// Square wave buffer length in frames.
    pub buffer_frames: Option<usize>,
    /// Delay between clock polls in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Requested frames per output callback.
    pub update_frames: Option<u32>,
    /// Requested output sample rate in Hz.
    pub rate: Option<u32>,
}

impl FileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Resolved settings for one demo run.
#[derive(Clone, Debug)]
pub struct DemoConfig {
    pub device: Option<String>,
    pub half_period: usize,
    pub buffer_frames: usize,
    pub poll_interval: Duration,
    pub update_frames: Option<u32>,
    /// Output rate; `None` keeps the device default.
    pub rate: Option<u32>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            device: None,
            half_period: WAVE_HALF_PERIOD,
            buffer_frames: BUFFER_FRAMES,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            update_frames: None,
            rate: None,
        }
    }
}

impl DemoConfig {
    /// Apply every field set in `layer` on top of `self`.
    pub fn merge(mut self, layer: FileConfig) -> Self {
        if let Some(device) = layer.device {
            self.device = normalize_device_name(Some(device));
        }
        if let Some(half_period) = layer.half_period {
            self.half_period = half_period;
        }
        if let Some(buffer_frames) = layer.buffer_frames {
            self.buffer_frames = buffer_frames;
        }
        if let Some(ms) = layer.poll_interval_ms {
            self.poll_interval = Duration::from_millis(ms);
        }
        if layer.update_frames.is_some() {
            self.update_frames = layer.update_frames;
        }
        if layer.rate.is_some() {
            self.rate = layer.rate;
        }
        self
    }

    /// Reject settings the phase alignment cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.half_period == 0 {
            bail!("half_period must be greater than zero");
        }
        let two_periods = self
            .half_period
            .checked_mul(4)
            .filter(|frames| *frames <= MAX_BUFFER_FRAMES)
            .with_context(|| format!("half_period ({}) is too large", self.half_period))?;
        if self.buffer_frames > MAX_BUFFER_FRAMES {
            bail!(
                "buffer_frames ({}) exceeds the maximum of {MAX_BUFFER_FRAMES}",
                self.buffer_frames
            );
        }
        if self.buffer_frames < two_periods {
            bail!(
                "buffer_frames ({}) must hold at least two periods ({two_periods} frames)",
                self.buffer_frames
            );
        }
        if self.rate == Some(0) {
            bail!("rate must be greater than zero");
        }
        if self.poll_interval.is_zero() {
            bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
