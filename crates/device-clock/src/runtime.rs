//! Demo runtime: open the device, play two phase-aligned square waves, clean up.
//!
//! The sequence mirrors what a caller of a device-clock capable driver does:
//! 1. open the output device and read its frequency
//! 2. create one buffer and two sources, upload a square wave
//! 3. start the first source and poll both sources' clock readings
//! 4. once the first source is far enough in, schedule the second one on the
//!    device tick that puts it half a period out of phase
//! 5. keep polling until the first source stops, then release everything

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use clock_mixer::config::OutputConfig;
use clock_mixer::mixer::{BufferId, Mixer, SharedMixer, SourceId, SourceState};
use clock_mixer::playback::{OutputDevice, lock_mixer};
use clock_mixer::{device, sync, wave};

use crate::config::DemoConfig;
use crate::report::{Reading, Variant};

/// Buffer and source pair created for one run.
#[derive(Clone, Copy, Debug)]
pub struct DemoSources {
    pub buffer: BufferId,
    pub sources: [SourceId; 2],
}

/// Summary of a finished poll loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollOutcome {
    /// Device tick the second source was scheduled on, if it was.
    pub scheduled_tick: Option<u64>,
    pub polls: usize,
    /// The loop stopped because of Ctrl-C rather than the first source ending.
    pub cancelled: bool,
}

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Run one demo on the configured output device.
pub fn run(config: &DemoConfig, variant: Variant, cancel: &AtomicBool) -> Result<()> {
    let host = cpal::default_host();
    let output = OutputDevice::open(
        &host,
        config.device.as_deref(),
        &OutputConfig {
            update_frames: config.update_frames,
            target_rate: config.rate,
        },
    )
    .context("Cannot open output device")?;

    let result = play_synchronised(&output, config, variant, cancel);
    output.close();
    result
}

fn play_synchronised(
    output: &OutputDevice,
    config: &DemoConfig,
    variant: Variant,
    cancel: &AtomicBool,
) -> Result<()> {
    let demo = {
        let mut m = output.lock()?;
        prepare(&mut m, config).context("Error creating buffer and sources")?
    };
    tracing::info!(
        device = %output.name(),
        buffer = demo.buffer.raw(),
        sources = ?demo.sources.map(SourceId::raw),
        frequency = output.frequency(),
        channels = output.channels(),
        sample_format = ?output.sample_format(),
        "square wave uploaded"
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let interval = config.poll_interval;
    let outcome = poll_until_done(
        output.mixer(),
        &demo,
        config,
        variant,
        cancel,
        &mut out,
        || thread::sleep(interval),
    );

    match output.lock() {
        Ok(mut m) => release(&mut m, &demo),
        Err(e) => tracing::warn!("skipping source cleanup: {e:#}"),
    }

    let outcome = outcome?;
    tracing::info!(
        polls = outcome.polls,
        scheduled_tick = ?outcome.scheduled_tick,
        cancelled = outcome.cancelled,
        "playback finished"
    );
    Ok(())
}

/// Create two sources sharing one square-wave buffer at the device frequency.
///
/// Fails if the device reported an error while they were being set up.
/// Nothing is left behind on failure.
pub fn prepare(mixer: &mut Mixer, config: &DemoConfig) -> Result<DemoSources> {
    let created = mixer.gen_sources(2);
    let sources = [created[0], created[1]];

    let rate = mixer.frequency();
    let uploaded = wave::square_wave(config.buffer_frames, config.half_period)
        .and_then(|samples| mixer.gen_buffer(samples, rate));
    let buffer = match uploaded {
        Ok(buffer) => buffer,
        Err(e) => {
            if let Err(del) = mixer.delete_sources(&sources) {
                tracing::warn!("source cleanup failed: {del}");
            }
            return Err(e).context("upload square wave");
        }
    };

    let demo = DemoSources { buffer, sources };
    let attached = sources.iter().try_for_each(|&source| {
        mixer.set_relative(source, true)?;
        mixer.set_looping(source, false)?;
        mixer.set_buffer(source, buffer)
    });
    if let Err(e) = attached {
        release(mixer, &demo);
        return Err(e).context("attach buffer to sources");
    }
    if let Some(err) = mixer.take_error() {
        release(mixer, &demo);
        return Err(err).context("output device error during setup");
    }
    Ok(demo)
}

/// Delete the sources, then the buffer they reference.
pub fn release(mixer: &mut Mixer, demo: &DemoSources) {
    if let Err(e) = mixer.delete_sources(&demo.sources) {
        tracing::warn!("delete sources failed: {e}");
    }
    if let Err(e) = mixer.delete_buffer(demo.buffer) {
        tracing::warn!("delete buffer failed: {e}");
    }
}

/// Play the first source and poll until it stops, scheduling the second on the way.
///
/// `wait` runs before every poll; the real device sleeps there while tests
/// render frames instead. One header line and two rows per poll go to `out`.
pub fn poll_until_done<W, F>(
    mixer: &SharedMixer,
    demo: &DemoSources,
    config: &DemoConfig,
    variant: Variant,
    cancel: &AtomicBool,
    out: &mut W,
    mut wait: F,
) -> Result<PollOutcome>
where
    W: Write,
    F: FnMut(),
{
    let [first, second] = demo.sources;
    let half_period = config.half_period as u64;
    let buffer_frames = config.buffer_frames as u64;

    lock_mixer(mixer)?
        .play(first)
        .context("start first source")?;
    writeln!(out, "{}", variant.header())?;

    let mut outcome = PollOutcome::default();
    loop {
        wait();
        outcome.polls += 1;

        let (state, readings, pending) = {
            let mut m = lock_mixer(mixer)?;
            let state = m.state(first)?;
            let readings = [read_source(&m, first)?, read_source(&m, second)?];

            let lead = readings[0].clock;
            if outcome.scheduled_tick.is_none()
                && sync::should_start_second(lead.sample_offset, half_period, buffer_frames)
            {
                let tick = sync::phase_aligned_start(&lead, half_period);
                m.play_at_clock(second, tick)
                    .context("schedule second source")?;
                tracing::info!(
                    tick,
                    device_clock = lead.device_clock,
                    sample_offset = lead.sample_offset,
                    "second source scheduled"
                );
                outcome.scheduled_tick = Some(tick);
            }
            (state, readings, m.take_error())
        };

        for (index, reading) in readings.iter().enumerate() {
            writeln!(out, "{}", variant.row(index, reading))?;
        }
        out.flush()?;

        if let Some(err) = pending {
            return Err(err).context("output device error");
        }
        if state != SourceState::Playing {
            break;
        }
        if cancel.load(Ordering::Relaxed) {
            tracing::info!("interrupted; stopping playback");
            outcome.cancelled = true;
            break;
        }
    }
    Ok(outcome)
}

fn read_source(mixer: &Mixer, source: SourceId) -> Result<Reading> {
    Ok(Reading {
        clock: mixer.clock_info(source)?,
        latency: mixer.latency_info(source)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clock_mixer::error::MixerError;

    const RATE: u32 = 48_000;
    const BLOCK: usize = 480;

    fn render_block(mixer: &SharedMixer, played: &mut Vec<f32>) {
        let mut block = vec![0.0; BLOCK];
        mixer.lock().unwrap().render(&mut block, 1);
        played.extend(block);
    }

    #[test]
    fn poll_loop_schedules_second_source_in_antiphase() {
        let mixer = Mixer::shared(RATE, BLOCK as u32);
        let config = DemoConfig::default();
        let demo = prepare(&mut mixer.lock().unwrap(), &config).unwrap();
        let cancel = AtomicBool::new(false);
        let mut out = Vec::new();
        let mut played = Vec::new();

        let outcome = poll_until_done(
            &mixer,
            &demo,
            &config,
            Variant::DeviceClock,
            &cancel,
            &mut out,
            || render_block(&mixer, &mut played),
        )
        .unwrap();

        assert_eq!(outcome.scheduled_tick, Some(26_368));
        assert!(!outcome.cancelled);
        let tick = 26_368;
        assert!(played[..tick].iter().all(|s| s.abs() == 1.0));
        assert!(played[tick..config.buffer_frames].iter().all(|s| *s == 0.0));

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(Variant::DeviceClock.header()));
        assert_eq!(lines.count(), outcome.polls * 2);
        assert!(text.contains("0, 480, 480, 48000, 480"));

        release(&mut mixer.lock().unwrap(), &demo);
    }

    #[test]
    fn poll_loop_stops_on_cancel() {
        let mixer = Mixer::shared(RATE, BLOCK as u32);
        let config = DemoConfig::default();
        let demo = prepare(&mut mixer.lock().unwrap(), &config).unwrap();
        let cancel = AtomicBool::new(true);
        let mut out = Vec::new();
        let mut played = Vec::new();

        let outcome = poll_until_done(
            &mixer,
            &demo,
            &config,
            Variant::Offset,
            &cancel,
            &mut out,
            || render_block(&mixer, &mut played),
        )
        .unwrap();

        assert_eq!(outcome.polls, 1);
        assert!(outcome.cancelled);
        assert_eq!(outcome.scheduled_tick, None);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Source, Offset\n0, 480\n1, 0\n"
        );
    }

    #[test]
    fn poll_loop_surfaces_stream_errors() {
        let mixer = Mixer::shared(RATE, BLOCK as u32);
        let config = DemoConfig::default();
        let demo = prepare(&mut mixer.lock().unwrap(), &config).unwrap();
        let cancel = AtomicBool::new(false);
        let mut out = Vec::new();

        let result = poll_until_done(
            &mixer,
            &demo,
            &config,
            Variant::Latency,
            &cancel,
            &mut out,
            || {
                mixer
                    .lock()
                    .unwrap()
                    .record_error(MixerError::Stream("device unplugged".to_string()));
            },
        );

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("device unplugged"));
    }

    #[test]
    fn prepare_and_release_leave_nothing_behind() {
        let mut mixer = Mixer::new(RATE, 0);
        let demo = prepare(&mut mixer, &DemoConfig::default()).unwrap();
        assert!(mixer.is_relative(demo.sources[0]).unwrap());
        assert_eq!(mixer.state(demo.sources[1]).unwrap(), SourceState::Initial);

        release(&mut mixer, &demo);
        assert!(mixer.state(demo.sources[0]).is_err());
        assert!(mixer.delete_buffer(demo.buffer).is_err());
    }

    #[test]
    fn prepare_fails_on_pending_device_error_and_plays_nothing() {
        let mut mixer = Mixer::new(RATE, 0);
        mixer.record_error(MixerError::Stream("device lost".to_string()));

        let err = prepare(&mut mixer, &DemoConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("device lost"));
        assert_eq!(mixer.take_error(), None);

        let mut out = vec![1.0; BLOCK];
        mixer.render(&mut out, 1);
        assert!(out.iter().all(|s| *s == 0.0));

        // Ids 1..=3 went to the released sources and buffer.
        let demo = prepare(&mut mixer, &DemoConfig::default()).unwrap();
        assert_eq!(demo.sources.map(SourceId::raw), [4, 5]);
        assert!(mixer.state(demo.sources[0]).is_ok());
    }

    #[test]
    fn prepare_cleans_up_sources_when_upload_fails() {
        let mut mixer = Mixer::new(RATE, 0);
        let config = DemoConfig {
            half_period: 0,
            ..DemoConfig::default()
        };
        assert!(prepare(&mut mixer, &config).is_err());

        // The next ids handed out follow the two deleted sources.
        let next = mixer.gen_sources(1)[0];
        assert!(mixer.state(next).is_ok());
        assert_eq!(next.raw(), 3);
    }
}
