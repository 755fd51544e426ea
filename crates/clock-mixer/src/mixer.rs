//! Buffers, sources and the device clock.
//!
//! [`Mixer`] is the state shared between the control thread and the output
//! callback. Every rendered frame advances the device clock by one, so a
//! source started with [`Mixer::play_at_clock`] begins on an exact output
//! frame and two sources can be phase-locked against each other.
//!
//! Clock queries read the source offset and the device clock under the same
//! lock, which keeps `device_clock - sample_offset` equal to the tick the
//! source's first frame was rendered on.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::MixerError;

/// Mixer shared with the output callback.
pub type SharedMixer = Arc<Mutex<Mixer>>;

/// Handle to an uploaded sample buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u32);

/// Handle to a playback source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u32);

impl BufferId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl SourceId {
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Playback state of a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    /// Created but never played.
    Initial,
    /// Playing, or scheduled to start on a future device clock tick.
    Playing,
    /// Reached the end of its buffer or was stopped explicitly.
    Stopped,
}

/// Sample offset of a source together with the device clock it was read at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockInfo {
    /// Frames of the source buffer already rendered.
    pub sample_offset: u64,
    /// Frames rendered by the device since it was opened.
    pub device_clock: u64,
    /// Device sample rate in Hz.
    pub frequency: u32,
    /// Frames rendered per output callback.
    pub update_size: u32,
}

/// Sample offset of a source with the device clock in nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyInfo {
    pub sample_offset: u64,
    pub clock_ns: u64,
    /// Distance between the last callback and its playback instant.
    pub latency_ns: u64,
}

struct BufferSlot {
    data: Arc<[f32]>,
}

struct SourceSlot {
    buffer: Option<BufferId>,
    looping: bool,
    relative: bool,
    state: SourceState,
    start_clock: u64,
    position: usize,
}

impl SourceSlot {
    fn new() -> Self {
        Self {
            buffer: None,
            looping: false,
            relative: false,
            state: SourceState::Initial,
            start_clock: 0,
            position: 0,
        }
    }

    /// Reported offset; only a playing source has a position in its buffer.
    fn offset(&self) -> u64 {
        match self.state {
            SourceState::Playing => self.position as u64,
            SourceState::Initial | SourceState::Stopped => 0,
        }
    }
}

/// Buffer/source registry plus the device clock.
pub struct Mixer {
    frequency: u32,
    update_size: u32,
    clock: u64,
    latency: Duration,
    next_id: u32,
    buffers: HashMap<u32, BufferSlot>,
    sources: BTreeMap<u32, SourceSlot>,
    last_error: Option<MixerError>,
}

impl Mixer {
    /// Create a mixer for a device running at `frequency` Hz.
    pub fn new(frequency: u32, update_size: u32) -> Self {
        Self {
            frequency,
            update_size,
            clock: 0,
            latency: Duration::ZERO,
            next_id: 1,
            buffers: HashMap::new(),
            sources: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Wrap a new mixer for sharing with an output callback.
    pub fn shared(frequency: u32, update_size: u32) -> SharedMixer {
        Arc::new(Mutex::new(Self::new(frequency, update_size)))
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn update_size(&self) -> u32 {
        self.update_size
    }

    /// Frames rendered since the mixer was created.
    pub fn device_clock(&self) -> u64 {
        self.clock
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    /// Upload mono samples. `rate` must match the device frequency.
    pub fn gen_buffer(&mut self, samples: Vec<f32>, rate: u32) -> Result<BufferId, MixerError> {
        if samples.is_empty() {
            return Err(MixerError::InvalidValue("buffer data is empty"));
        }
        if rate != self.frequency {
            return Err(MixerError::InvalidValue(
                "buffer rate differs from device frequency",
            ));
        }
        let id = self.alloc_id();
        self.buffers.insert(
            id,
            BufferSlot {
                data: samples.into(),
            },
        );
        tracing::debug!(buffer = id, rate, "buffer created");
        Ok(BufferId(id))
    }

    /// Delete a buffer. Fails while any source still references it.
    pub fn delete_buffer(&mut self, id: BufferId) -> Result<(), MixerError> {
        if !self.buffers.contains_key(&id.0) {
            return Err(invalid_buffer(id));
        }
        if self.sources.values().any(|s| s.buffer == Some(id)) {
            return Err(MixerError::InvalidOperation("buffer is attached to a source"));
        }
        self.buffers.remove(&id.0);
        Ok(())
    }

    pub fn gen_sources(&mut self, count: usize) -> Vec<SourceId> {
        (0..count)
            .map(|_| {
                let id = self.alloc_id();
                self.sources.insert(id, SourceSlot::new());
                SourceId(id)
            })
            .collect()
    }

    /// Delete sources. Nothing is removed if any id is unknown.
    pub fn delete_sources(&mut self, ids: &[SourceId]) -> Result<(), MixerError> {
        if let Some(missing) = ids.iter().find(|id| !self.sources.contains_key(&id.0)) {
            return Err(invalid_source(*missing));
        }
        for id in ids {
            self.sources.remove(&id.0);
        }
        Ok(())
    }

    /// Attach `buffer` to a source that is not currently playing.
    pub fn set_buffer(&mut self, source: SourceId, buffer: BufferId) -> Result<(), MixerError> {
        if !self.buffers.contains_key(&buffer.0) {
            return Err(invalid_buffer(buffer));
        }
        let slot = self.source_mut(source)?;
        if slot.state == SourceState::Playing {
            return Err(MixerError::InvalidOperation(
                "cannot change the buffer of a playing source",
            ));
        }
        slot.buffer = Some(buffer);
        slot.position = 0;
        Ok(())
    }

    pub fn set_looping(&mut self, source: SourceId, looping: bool) -> Result<(), MixerError> {
        self.source_mut(source)?.looping = looping;
        Ok(())
    }

    /// Mark a source as listener-relative. Sources are not spatialised, so
    /// this is only recorded.
    pub fn set_relative(&mut self, source: SourceId, relative: bool) -> Result<(), MixerError> {
        self.source_mut(source)?.relative = relative;
        Ok(())
    }

    pub fn is_relative(&self, source: SourceId) -> Result<bool, MixerError> {
        Ok(self.source(source)?.relative)
    }

    /// Start (or restart) a source on the next rendered frame.
    pub fn play(&mut self, source: SourceId) -> Result<(), MixerError> {
        let clock = self.clock;
        self.start_source(source, clock)
    }

    /// Start a source exactly when the device clock reaches `tick`.
    ///
    /// A tick that has already been rendered starts the source on the next frame.
    pub fn play_at_clock(&mut self, source: SourceId, tick: u64) -> Result<(), MixerError> {
        let clock = self.clock;
        if tick < clock {
            tracing::warn!(
                source = source.0,
                tick,
                device_clock = clock,
                "requested start tick already rendered; starting immediately"
            );
        }
        self.start_source(source, tick.max(clock))
    }

    fn start_source(&mut self, source: SourceId, start_clock: u64) -> Result<(), MixerError> {
        let slot = self.source_mut(source)?;
        if slot.buffer.is_none() {
            return Err(MixerError::InvalidOperation("source has no buffer"));
        }
        slot.state = SourceState::Playing;
        slot.position = 0;
        slot.start_clock = start_clock;
        Ok(())
    }

    pub fn stop(&mut self, source: SourceId) -> Result<(), MixerError> {
        self.source_mut(source)?.state = SourceState::Stopped;
        Ok(())
    }

    pub fn state(&self, source: SourceId) -> Result<SourceState, MixerError> {
        Ok(self.source(source)?.state)
    }

    /// Read the source offset and device clock as one consistent pair.
    pub fn clock_info(&self, source: SourceId) -> Result<ClockInfo, MixerError> {
        let slot = self.source(source)?;
        Ok(ClockInfo {
            sample_offset: slot.offset(),
            device_clock: self.clock,
            frequency: self.frequency,
            update_size: self.update_size,
        })
    }

    /// Like [`Mixer::clock_info`] but with the clock in nanoseconds and the
    /// last measured output latency.
    pub fn latency_info(&self, source: SourceId) -> Result<LatencyInfo, MixerError> {
        let slot = self.source(source)?;
        Ok(LatencyInfo {
            sample_offset: slot.offset(),
            clock_ns: frames_to_ns(self.clock, self.frequency),
            latency_ns: u64::try_from(self.latency.as_nanos()).unwrap_or(u64::MAX),
        })
    }

    /// Record the callback-to-playback distance reported by the output stream.
    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    /// Keep the first asynchronous error until [`Mixer::take_error`] drains it.
    pub fn record_error(&mut self, err: MixerError) {
        if self.last_error.is_none() {
            self.last_error = Some(err);
        }
    }

    /// Return and clear the pending asynchronous error.
    pub fn take_error(&mut self) -> Option<MixerError> {
        self.last_error.take()
    }

    /// Render interleaved frames into `out` and advance the device clock.
    ///
    /// Every playing source is summed into all `channels`. Sources scheduled
    /// for a later tick stay silent until the clock reaches it.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        out.fill(0.0);

        for slot in self.sources.values_mut() {
            if slot.state != SourceState::Playing {
                continue;
            }
            let Some(data) = slot
                .buffer
                .and_then(|b| self.buffers.get(&b.0))
                .map(|b| &b.data)
            else {
                slot.state = SourceState::Stopped;
                continue;
            };

            let first = slot.start_clock.saturating_sub(self.clock);
            let first = usize::try_from(first).unwrap_or(usize::MAX).min(frames);
            for frame in first..frames {
                if slot.position >= data.len() {
                    if slot.looping {
                        slot.position = 0;
                    } else {
                        break;
                    }
                }
                let sample = data[slot.position];
                slot.position += 1;
                for s in &mut out[frame * channels..(frame + 1) * channels] {
                    *s += sample;
                }
            }

            if !slot.looping && slot.position >= data.len() {
                slot.state = SourceState::Stopped;
            }
        }

        self.clock += frames as u64;
        if frames > 0 {
            self.update_size = u32::try_from(frames).unwrap_or(u32::MAX);
        }
    }

    fn source(&self, id: SourceId) -> Result<&SourceSlot, MixerError> {
        self.sources.get(&id.0).ok_or_else(|| invalid_source(id))
    }

    fn source_mut(&mut self, id: SourceId) -> Result<&mut SourceSlot, MixerError> {
        self.sources.get_mut(&id.0).ok_or_else(|| invalid_source(id))
    }
}

fn invalid_source(id: SourceId) -> MixerError {
    MixerError::InvalidName {
        kind: "source",
        id: id.0,
    }
}

fn invalid_buffer(id: BufferId) -> MixerError {
    MixerError::InvalidName {
        kind: "buffer",
        id: id.0,
    }
}

fn frames_to_ns(frames: u64, frequency: u32) -> u64 {
    if frequency == 0 {
        return 0;
    }
    let ns = u128::from(frames) * 1_000_000_000 / u128::from(frequency);
    u64::try_from(ns).unwrap_or(u64::MAX)
}
