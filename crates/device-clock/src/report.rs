//! Table output for the poll loop.
//!
//! Each variant prints a header once and then one comma-separated row per
//! source per poll.

use clock_mixer::mixer::{ClockInfo, LatencyInfo};

/// Which clock readings a run prints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    /// Sample offset, device clock in frames, frequency, update size.
    DeviceClock,
    /// Sample offset, device clock in nanoseconds, output latency.
    Latency,
    /// Sample offset only.
    Offset,
}

/// Clock readings for one source taken under a single mixer lock.
#[derive(Clone, Copy, Debug)]
pub struct Reading {
    pub clock: ClockInfo,
    pub latency: LatencyInfo,
}

impl Variant {
    pub fn header(self) -> &'static str {
        match self {
            Variant::DeviceClock => "Source, Offset, OutputSampleCount, Frequency, UpdateSize",
            Variant::Latency => "Source, Offset, ClockNs, LatencyNs",
            Variant::Offset => "Source, Offset",
        }
    }

    pub fn row(self, source: usize, reading: &Reading) -> String {
        match self {
            Variant::DeviceClock => format!(
                "{source}, {}, {}, {}, {}",
                reading.clock.sample_offset,
                reading.clock.device_clock,
                reading.clock.frequency,
                reading.clock.update_size
            ),
            Variant::Latency => format!(
                "{source}, {}, {}, {}",
                reading.latency.sample_offset, reading.latency.clock_ns, reading.latency.latency_ns
            ),
            Variant::Offset => format!("{source}, {}", reading.clock.sample_offset),
        }
    }
}
