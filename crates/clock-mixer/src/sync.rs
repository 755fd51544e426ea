//! Phase alignment between two copies of a periodic waveform.
//!
//! Given a clock reading for a source that is already playing a square wave,
//! [`phase_aligned_start`] picks a future device tick at which an identical
//! source sits exactly half a period out of phase with it. While both play,
//! their sum is silence.

use crate::mixer::ClockInfo;

/// Whole half periods between the current period boundary and the start tick.
///
/// Must be odd for the second wave to be inverted. With five the tick is
/// always at least three half periods past the clock reading.
pub const LEAD_HALF_PERIODS: u64 = 5;

/// Device tick at which a copy of the playing square wave cancels it.
///
/// `info` must come from the already-playing source: the tick is its last
/// period boundary (`device_clock - sample_offset % period`) plus
/// [`LEAD_HALF_PERIODS`] half periods.
pub fn phase_aligned_start(info: &ClockInfo, half_period: u64) -> u64 {
    let period = half_period.saturating_mul(2);
    let into_period = if period == 0 {
        0
    } else {
        info.sample_offset % period
    };
    info.device_clock
        .saturating_sub(into_period)
        .saturating_add(LEAD_HALF_PERIODS.saturating_mul(half_period))
}

/// Whether the first source is far enough in to schedule the second one.
///
/// Fires once the offset plus one period passes a quarter of the buffer.
pub fn should_start_second(sample_offset: u64, half_period: u64, buffer_frames: u64) -> bool {
    sample_offset.saturating_add(half_period.saturating_mul(2)) > buffer_frames / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(sample_offset: u64, device_clock: u64) -> ClockInfo {
        ClockInfo {
            sample_offset,
            device_clock,
            frequency: 48_000,
            update_size: 480,
        }
    }

    #[test]
    fn start_lands_half_a_period_into_first_source() {
        let half = 256;
        for (offset, clock) in [(25_440, 25_440), (25_100, 30_000), (512, 1_000_000)] {
            let tick = phase_aligned_start(&info(offset, clock), half);
            let first_started = clock - offset;
            let first_offset_at_tick = tick - first_started;
            assert_eq!(first_offset_at_tick % (2 * half), half);
            assert!(tick > clock);
        }
    }

    #[test]
    fn start_matches_known_reading() {
        assert_eq!(phase_aligned_start(&info(25_440, 25_440), 256), 26_368);
    }

    #[test]
    fn start_saturates_instead_of_wrapping() {
        let tick = phase_aligned_start(&info(10, 5), 256);
        assert_eq!(tick, 5 * 256);
    }

    #[test]
    fn trigger_waits_for_quarter_buffer() {
        assert!(!should_start_second(0, 256, 102_400));
        assert!(!should_start_second(25_088, 256, 102_400));
        assert!(should_start_second(25_089, 256, 102_400));
    }
}
