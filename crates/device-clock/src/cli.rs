//! Command-line interface definitions.
//!
//! The three commands run the same synchronised-playback sequence and differ
//! only in which clock readings they print.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::FileConfig;
use crate::report::Variant;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(
    name = "device-clock",
    version = VERSION,
    about = "Phase-align two square waves on the output device clock so they cancel"
)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// TOML file with demo settings (CLI flags take precedence)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Square wave half period in frames
    #[arg(long)]
    pub half_period: Option<usize>,

    /// Square wave buffer length in frames
    #[arg(long)]
    pub buffer_frames: Option<usize>,

    /// Delay between clock polls in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Requested frames per output callback
    #[arg(long)]
    pub update_frames: Option<u32>,

    /// Output sample rate in Hz (defaults to the device rate)
    #[arg(long)]
    pub rate: Option<u32>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print sample offset, device clock, frequency and update size (default)
    Clock,
    /// Print sample offset, device clock in nanoseconds and output latency
    Latency,
    /// Print only the sample offset of each source
    Offset,
}

impl Args {
    /// Which report to print; `clock` when no command was given.
    pub fn variant(&self) -> Variant {
        match self.cmd.unwrap_or(Command::Clock) {
            Command::Clock => Variant::DeviceClock,
            Command::Latency => Variant::Latency,
            Command::Offset => Variant::Offset,
        }
    }

    /// CLI flags as the highest-precedence config layer.
    pub fn overrides(&self) -> FileConfig {
        FileConfig {
            device: self.device.clone(),
            half_period: self.half_period,
            buffer_frames: self.buffer_frames,
            poll_interval_ms: self.poll_ms,
            update_frames: self.update_frames,
            rate: self.rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_command_defaults_to_device_clock() {
        let args = Args::try_parse_from(["device-clock"]).unwrap();
        assert_eq!(args.variant(), Variant::DeviceClock);
        assert!(!args.list_devices);
    }

    #[test]
    fn commands_select_variant() {
        let args = Args::try_parse_from(["device-clock", "latency"]).unwrap();
        assert_eq!(args.variant(), Variant::Latency);
        let args = Args::try_parse_from(["device-clock", "offset"]).unwrap();
        assert_eq!(args.variant(), Variant::Offset);
    }

    #[test]
    fn flags_become_overrides() {
        let args = Args::try_parse_from([
            "device-clock",
            "--device",
            "usb",
            "--half-period",
            "128",
            "--poll-ms",
            "5",
            "--rate",
            "44100",
            "clock",
        ])
        .unwrap();
        let o = args.overrides();
        assert_eq!(o.device.as_deref(), Some("usb"));
        assert_eq!(o.half_period, Some(128));
        assert_eq!(o.poll_interval_ms, Some(5));
        assert_eq!(o.buffer_frames, None);
        assert_eq!(o.update_frames, None);
        assert_eq!(o.rate, Some(44_100));
    }
}
