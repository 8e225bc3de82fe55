//! Output clock: a frame-counting mixer for scheduled buffers
//!
//! The playback device pulls frames from the timeline; its position in
//! rendered frames *is* the output clock. Buffers are placed at absolute
//! start times, summed where they overlap, and reported once fully rendered.

use crate::events::BufferId;

/// One buffer placed on the timeline
#[derive(Debug)]
struct Voice {
    id: BufferId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Mixer state shared between the scheduler and the device callback
#[derive(Debug)]
pub struct Timeline {
    sample_rate: u32,
    rendered_frames: u64,
    voices: Vec<Voice>,
}

impl Timeline {
    /// Create an empty timeline at time zero
    #[must_use]
    pub const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            rendered_frames: 0,
            voices: Vec::new(),
        }
    }

    /// Current output clock time in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn now(&self) -> f64 {
        self.rendered_frames as f64 / f64::from(self.sample_rate)
    }

    /// Frames rendered so far
    #[must_use]
    pub const fn rendered_frames(&self) -> u64 {
        self.rendered_frames
    }

    /// Number of buffers not yet fully rendered
    #[must_use]
    pub fn pending(&self) -> usize {
        self.voices.len()
    }

    /// Place mono `samples` to start at `start_at` seconds
    ///
    /// Start times already in the past begin at the next rendered frame.
    /// Returns the start time actually used.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn insert(&mut self, id: BufferId, start_at: f64, samples: Vec<f32>) -> f64 {
        let requested = (start_at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let start_frame = requested.max(self.rendered_frames);
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        start_frame as f64 / f64::from(self.sample_rate)
    }

    /// Remove a buffer before it finishes; returns whether it was present
    pub fn remove(&mut self, id: BufferId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.id != id);
        self.voices.len() != before
    }

    /// Drop every buffer and rewind the clock to zero
    pub fn reset(&mut self) {
        self.voices.clear();
        self.rendered_frames = 0;
    }

    /// Render the next frames into interleaved `out`
    ///
    /// Every channel of a frame receives the same mixed sample. Returns the
    /// ids of buffers that finished during this call, in start order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn render(&mut self, out: &mut [f32], channels: usize) -> Vec<BufferId> {
        let channels = channels.max(1);
        let frames = out.len() / channels;
        let window_start = self.rendered_frames;
        let window_end = window_start + frames as u64;

        out.fill(0.0);

        for voice in &self.voices {
            let from = voice.start_frame.max(window_start);
            let to = voice.end_frame().min(window_end);
            for frame in from..to {
                let sample = voice.samples[(frame - voice.start_frame) as usize];
                let offset = (frame - window_start) as usize * channels;
                for slot in &mut out[offset..offset + channels] {
                    *slot += sample;
                }
            }
        }

        for slot in out.iter_mut() {
            *slot = slot.clamp(-1.0, 1.0);
        }

        self.rendered_frames = window_end;

        let mut finished: Vec<&Voice> = self
            .voices
            .iter()
            .filter(|v| v.end_frame() <= window_end)
            .collect();
        finished.sort_by_key(|v| v.start_frame);
        let ids: Vec<BufferId> = finished.iter().map(|v| v.id).collect();

        self.voices.retain(|v| v.end_frame() > window_end);
        ids
    }
}
