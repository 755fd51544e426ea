//! Output device discovery and stream configuration.
//!
//! Thin wrappers around CPAL for:
//! - selecting either the default device or a device by substring match
//! - choosing a stream config at the device's native rate
//! - requesting a fixed callback size (the device update size)

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick a CPAL output device.
///
/// If `needle` is `Some`, chooses the first output device whose name contains the
/// substring (case-insensitive). Otherwise returns the host default output device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let mut devices = host.output_devices().context("No output devices")?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose an output config at `target_rate`, or at the device default rate when unset.
///
/// Among the ranges that support the rate, prefers `f32` output and the default
/// channel count. Falls back to the device default config when no range matches.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let default = device
        .default_output_config()
        .context("No default output config")?;
    let rate = target_rate.unwrap_or_else(|| default.sample_rate());

    let best = device
        .supported_output_configs()
        .context("query supported output configs")?
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .filter_map(|r| sample_format_rank(r.sample_format()).map(|rank| (rank, r)))
        .min_by_key(|(rank, r)| (*rank, r.channels().abs_diff(default.channels())));

    match best {
        Some((_, range)) => Ok(range.with_sample_rate(rate)),
        None => {
            tracing::warn!(
                rate_hz = rate,
                "no supported config at requested rate; using device default"
            );
            Ok(default)
        }
    }
}

/// Fixed callback size for `requested` frames, clamped to what the device supports.
///
/// Returns `None` when nothing was requested or the device only has a default size.
pub fn pick_buffer_size(
    config: &cpal::SupportedStreamConfig,
    requested: Option<u32>,
) -> Option<cpal::BufferSize> {
    let requested = requested.filter(|frames| *frames > 0)?;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            clamp_update_frames(requested, *min, *max),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout.
///
/// This is intended for CLI UX (`--list-devices`) rather than structured output.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn clamp_update_frames(requested: u32, min: u32, max: u32) -> u32 {
    if min > max {
        return requested;
    }
    requested.clamp(min, max)
}

/// Lower is better; `None` for formats the output callback cannot write.
fn sample_format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I32 => Some(1),
        cpal::SampleFormat::I16 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        _ => None,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
