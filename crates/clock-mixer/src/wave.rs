//! Test-tone generation.

use crate::error::MixerError;

/// Frames per half period of the demo square wave.
pub const WAVE_HALF_PERIOD: usize = 256;

/// Length of the demo buffer in frames.
pub const BUFFER_FRAMES: usize = 102_400;

/// Generate a mono square wave that starts high and flips sign every `half_period` frames.
pub fn square_wave(frames: usize, half_period: usize) -> Result<Vec<f32>, MixerError> {
    if half_period == 0 {
        return Err(MixerError::InvalidValue("square wave half period must be non-zero"));
    }
    Ok((0..frames)
        .map(|i| if (i / half_period) % 2 == 0 { 1.0 } else { -1.0 })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_wave_starts_high_and_flips_each_half_period() {
        let wave = square_wave(12, 3).unwrap();
        assert_eq!(
            wave,
            vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0]
        );
    }

    #[test]
    fn square_wave_has_requested_length() {
        let wave = square_wave(BUFFER_FRAMES, WAVE_HALF_PERIOD).unwrap();
        assert_eq!(wave.len(), BUFFER_FRAMES);
        assert_eq!(wave[WAVE_HALF_PERIOD - 1], 1.0);
        assert_eq!(wave[WAVE_HALF_PERIOD], -1.0);
        assert_eq!(wave[2 * WAVE_HALF_PERIOD], 1.0);
    }

    #[test]
    fn square_wave_rejects_zero_half_period() {
        assert!(matches!(
            square_wave(16, 0),
            Err(MixerError::InvalidValue(_))
        ));
    }

    #[test]
    fn square_wave_of_zero_frames_is_empty() {
        assert!(square_wave(0, 4).unwrap().is_empty());
    }
}
