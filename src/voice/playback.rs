//! Gapless playback of inbound audio chunks
//!
//! The scheduler owns the playback cursor and the set of buffers still
//! playing. Each decoded chunk starts at `max(cursor, clock.now())` and the
//! cursor advances by its duration, so chunks of one turn play back to back
//! with no gaps and no overlaps.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::events::{self, BufferId, Event, EventSender, SessionId};
use crate::voice::codec::{self, AudioBuffer};
use crate::voice::timeline::Timeline;
use crate::{Error, Result};

/// Sample rate for playback of remote speech
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Channels of inbound remote speech
pub const PLAYBACK_CHANNELS: u16 = 1;

/// Output device seam
///
/// Implementations own the output clock domain. Buffers finishing naturally
/// are reported by posting `Event::PlaybackEnded` for the session passed to
/// `open`; halted buffers are not reported.
pub trait AudioOutput {
    /// Open the output clock for `session`, starting at time zero
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    fn open(&mut self, session: SessionId, events: EventSender) -> Result<()>;

    /// Current output clock time in seconds
    fn now(&self) -> f64;

    /// Play `buffer` starting at `start_at` seconds on the output clock
    ///
    /// The clock may have moved past `start_at` since it was read; the
    /// returned value is the start time the buffer was actually given.
    ///
    /// # Errors
    ///
    /// Returns error if the output clock is not open
    fn schedule(&mut self, id: BufferId, start_at: f64, buffer: AudioBuffer) -> Result<f64>;

    /// Stop one buffer immediately
    fn halt(&mut self, id: BufferId);

    /// Close the output clock; safe to call repeatedly
    fn close(&mut self);

    /// Whether the output clock is running
    fn is_open(&self) -> bool;
}

/// Where a chunk was placed on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    /// Buffer identifier
    pub id: BufferId,
    /// Start time in seconds
    pub start_at: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledBuffer {
    /// End time in seconds
    #[must_use]
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }
}

/// Schedules decoded chunks back to back on the output clock
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    next_start: f64,
    active: BTreeSet<BufferId>,
    next_id: BufferId,
}

impl PlaybackScheduler {
    /// Create a scheduler around an output device
    #[must_use]
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self {
            output,
            next_start: 0.0,
            active: BTreeSet::new(),
            next_id: 0,
        }
    }

    /// Open the output clock for a new session and reset the cursor
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot be opened
    pub fn begin(&mut self, session: SessionId, events: EventSender) -> Result<()> {
        self.halt_all();
        self.next_start = 0.0;
        self.output.open(session, events)?;
        tracing::debug!(session = %session, "playback clock opened");
        Ok(())
    }

    /// Decode an inbound payload and schedule it after everything queued
    ///
    /// # Errors
    ///
    /// Returns `Error::Decode` for a malformed payload (nothing is scheduled
    /// and the cursor is unchanged), or an audio error if the output clock
    /// is closed
    pub fn enqueue(&mut self, payload: &str) -> Result<ScheduledBuffer> {
        if !self.output.is_open() {
            return Err(Error::Audio("output clock is not running".to_string()));
        }

        let buffer = codec::decode_chunk(payload, PLAYBACK_SAMPLE_RATE, PLAYBACK_CHANNELS)?;
        let duration = buffer.duration();
        let requested = self.next_start.max(self.output.now());

        let id = self.next_id;
        let start_at = self.output.schedule(id, requested, buffer)?;
        self.next_id += 1;
        self.next_start = start_at + duration;
        self.active.insert(id);

        tracing::trace!(buffer = id, start_at, duration, "scheduled playback buffer");

        Ok(ScheduledBuffer {
            id,
            start_at,
            duration,
        })
    }

    /// Record that a buffer finished naturally; returns whether it was active
    pub fn on_ended(&mut self, id: BufferId) -> bool {
        self.active.remove(&id)
    }

    /// Halt every active buffer and clear the set
    pub fn halt_all(&mut self) {
        if self.active.is_empty() {
            return;
        }

        tracing::debug!(buffers = self.active.len(), "halting playback");
        for id in std::mem::take(&mut self.active) {
            self.output.halt(id);
        }
    }

    /// Drop queued speech after a barge-in
    ///
    /// The cursor rewinds to the output clock so the next chunk plays at once.
    pub fn interrupt(&mut self) {
        self.halt_all();
        self.next_start = self.output.now();
    }

    /// Halt everything and close the output clock
    pub fn close(&mut self) {
        self.halt_all();
        if self.output.is_open() {
            self.output.close();
            tracing::debug!("playback clock closed");
        }
    }

    /// Start time for the next chunk
    #[must_use]
    pub const fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Buffers scheduled and not yet finished
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether a buffer is still playing
    #[must_use]
    pub fn is_active(&self, id: BufferId) -> bool {
        self.active.contains(&id)
    }

    /// Whether the output clock is running
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.output.is_open()
    }
}

/// Plays audio to the default output device
pub struct CpalOutput {
    timeline: Arc<Mutex<Timeline>>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Create a closed output
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline::new(PLAYBACK_SAMPLE_RATE))),
            stream: None,
        }
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for CpalOutput {
    fn open(&mut self, session: SessionId, events: EventSender) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;
        let config = select_output_config(&device)?;
        let channels = usize::from(config.channels);

        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.reset();
        }

        let timeline = Arc::clone(&self.timeline);
        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let finished = match timeline.lock() {
                        Ok(mut timeline) => timeline.render(data, channels),
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    for buffer in finished {
                        events::post(&events, Event::PlaybackEnded { session, buffer });
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels,
            "audio playback initialized"
        );
        Ok(())
    }

    fn now(&self) -> f64 {
        self.timeline.lock().map_or(0.0, |t| t.now())
    }

    fn schedule(&mut self, id: BufferId, start_at: f64, buffer: AudioBuffer) -> Result<f64> {
        if self.stream.is_none() {
            return Err(Error::Audio("output stream is closed".to_string()));
        }

        let start = self
            .timeline
            .lock()
            .map_err(|_| Error::Audio("playback timeline poisoned".to_string()))?
            .insert(id, start_at, buffer.to_mono());
        Ok(start)
    }

    fn halt(&mut self, id: BufferId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.remove(id);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.reset();
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Prefer 24kHz mono, fall back to 24kHz stereo
fn select_output_config(device: &cpal::Device) -> Result<StreamConfig> {
    let supports = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
        })
    };

    supports(1)
        .or_else(|| supports(2))
        .map(|c| c.with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE)).config())
        .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[derive(Default)]
    struct FakeClock {
        open: bool,
        now: f64,
        scheduled: Vec<(BufferId, f64)>,
        halted: Vec<BufferId>,
    }

    struct FakeOutput(Arc<Mutex<FakeClock>>);

    impl AudioOutput for FakeOutput {
        fn open(&mut self, _session: SessionId, _events: EventSender) -> Result<()> {
            self.0.lock().unwrap().open = true;
            Ok(())
        }

        fn now(&self) -> f64 {
            self.0.lock().unwrap().now
        }

        fn schedule(&mut self, id: BufferId, start_at: f64, _buffer: AudioBuffer) -> Result<f64> {
            self.0.lock().unwrap().scheduled.push((id, start_at));
            Ok(start_at)
        }

        fn halt(&mut self, id: BufferId) {
            self.0.lock().unwrap().halted.push(id);
        }

        fn close(&mut self) {
            self.0.lock().unwrap().open = false;
        }

        fn is_open(&self) -> bool {
            self.0.lock().unwrap().open
        }
    }

    fn silence(frames: usize) -> String {
        base64::engine::general_purpose::STANDARD.encode(vec![0u8; frames * 2])
    }

    fn open_scheduler() -> (PlaybackScheduler, Arc<Mutex<FakeClock>>) {
        let clock = Arc::new(Mutex::new(FakeClock::default()));
        let mut scheduler = PlaybackScheduler::new(Box::new(FakeOutput(Arc::clone(&clock))));
        let (tx, _rx) = events::channel();
        scheduler.begin(SessionId::new(), tx).unwrap();
        (scheduler, clock)
    }

    #[test]
    fn test_chunks_are_scheduled_back_to_back() {
        let (mut scheduler, _clock) = open_scheduler();

        let first = scheduler.enqueue(&silence(24000)).unwrap();
        let second = scheduler.enqueue(&silence(12000)).unwrap();
        let third = scheduler.enqueue(&silence(6000)).unwrap();

        assert!(first.start_at.abs() < f64::EPSILON);
        assert!((second.start_at - 1.0).abs() < f64::EPSILON);
        assert!((third.start_at - 1.5).abs() < f64::EPSILON);
        assert!((scheduler.next_start() - 1.75).abs() < f64::EPSILON);
        assert_eq!(scheduler.active_count(), 3);
    }

    #[test]
    fn test_late_chunk_starts_at_clock() {
        let (mut scheduler, clock) = open_scheduler();
        scheduler.enqueue(&silence(2400)).unwrap();

        clock.lock().unwrap().now = 5.0;
        let late = scheduler.enqueue(&silence(2400)).unwrap();
        assert!((late.start_at - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ended_buffers_leave_active_set() {
        let (mut scheduler, _clock) = open_scheduler();
        let a = scheduler.enqueue(&silence(100)).unwrap();
        let b = scheduler.enqueue(&silence(100)).unwrap();

        assert!(scheduler.on_ended(a.id));
        assert!(!scheduler.on_ended(a.id));
        assert!(!scheduler.is_active(a.id));
        assert!(scheduler.is_active(b.id));
    }

    #[test]
    fn test_halt_all_stops_remaining_buffers() {
        let (mut scheduler, clock) = open_scheduler();
        let a = scheduler.enqueue(&silence(100)).unwrap();
        let b = scheduler.enqueue(&silence(100)).unwrap();
        scheduler.on_ended(a.id);

        scheduler.halt_all();
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(clock.lock().unwrap().halted, vec![b.id]);

        scheduler.halt_all();
        assert_eq!(clock.lock().unwrap().halted.len(), 1);
    }

    #[test]
    fn test_decode_error_does_not_disturb_cursor() {
        let (mut scheduler, _clock) = open_scheduler();
        scheduler.enqueue(&silence(2400)).unwrap();
        let cursor = scheduler.next_start();

        assert!(matches!(scheduler.enqueue("%%%"), Err(Error::Decode(_))));
        assert!((scheduler.next_start() - cursor).abs() < f64::EPSILON);

        let next = scheduler.enqueue(&silence(2400)).unwrap();
        assert!((next.start_at - cursor).abs() < f64::EPSILON);
    }

    #[test]
    fn test_closed_output_rejects_chunks() {
        let (mut scheduler, _clock) = open_scheduler();
        scheduler.close();
        assert!(!scheduler.is_open());
        assert!(matches!(scheduler.enqueue(&silence(10)), Err(Error::Audio(_))));
    }

    #[test]
    fn test_begin_resets_cursor() {
        let (mut scheduler, _clock) = open_scheduler();
        scheduler.enqueue(&silence(24000)).unwrap();
        scheduler.close();

        let (tx, _rx) = events::channel();
        scheduler.begin(SessionId::new(), tx).unwrap();
        assert!(scheduler.next_start().abs() < f64::EPSILON);
        assert_eq!(scheduler.active_count(), 0);
    }

    /// Output on a real timeline whose device renders `lag` frames between
    /// the scheduler reading the clock and the buffer being placed
    struct LaggingOutput {
        timeline: Arc<Mutex<Timeline>>,
        lag: usize,
        open: bool,
    }

    impl AudioOutput for LaggingOutput {
        fn open(&mut self, _session: SessionId, _events: EventSender) -> Result<()> {
            self.timeline.lock().unwrap().reset();
            self.open = true;
            Ok(())
        }

        fn now(&self) -> f64 {
            self.timeline.lock().unwrap().now()
        }

        fn schedule(&mut self, id: BufferId, start_at: f64, buffer: AudioBuffer) -> Result<f64> {
            let mut timeline = self.timeline.lock().unwrap();
            let mut out = vec![0.0; self.lag];
            timeline.render(&mut out, 1);
            Ok(timeline.insert(id, start_at, buffer.to_mono()))
        }

        fn halt(&mut self, id: BufferId) {
            self.timeline.lock().unwrap().remove(id);
        }

        fn close(&mut self) {
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    #[test]
    fn test_clock_moving_during_schedule_does_not_overlap() {
        let timeline = Arc::new(Mutex::new(Timeline::new(PLAYBACK_SAMPLE_RATE)));
        let mut scheduler = PlaybackScheduler::new(Box::new(LaggingOutput {
            timeline: Arc::clone(&timeline),
            lag: 480,
            open: false,
        }));
        let (tx, _rx) = events::channel();
        scheduler.begin(SessionId::new(), tx).unwrap();

        let quiet = codec::encode_frame(&vec![0.25; 2400], PLAYBACK_SAMPLE_RATE).data;
        let loud = codec::encode_frame(&vec![0.5; 2400], PLAYBACK_SAMPLE_RATE).data;
        let a = scheduler.enqueue(&quiet).unwrap();
        let b = scheduler.enqueue(&loud).unwrap();

        // a was pushed back by the frames rendered before it landed
        assert!((a.start_at - 0.02).abs() < 1e-9);
        assert!((b.start_at - a.end_at()).abs() < 1e-9);
        assert!((scheduler.next_start() - b.end_at()).abs() < 1e-9);

        // 960 frames already rendered; the rest of a, then all of b
        let mut out = vec![0.0; 4320];
        let finished = timeline.lock().unwrap().render(&mut out, 1);
        assert_eq!(finished, vec![a.id, b.id]);
        assert!(out[..1920].iter().all(|&s| (s - 0.25).abs() < f32::EPSILON));
        assert!(out[1920..].iter().all(|&s| (s - 0.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_interrupt_rewinds_to_clock() {
        let (mut scheduler, clock) = open_scheduler();
        scheduler.enqueue(&silence(24000)).unwrap();
        clock.lock().unwrap().now = 0.25;

        scheduler.interrupt();
        assert_eq!(scheduler.active_count(), 0);
        assert!((scheduler.next_start() - 0.25).abs() < f64::EPSILON);
    }
}
