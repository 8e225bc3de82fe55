//! Microphone capture pipeline
//!
//! The input device delivers samples on its own clock. Each callback is
//! down-mixed, converted to 16kHz and sliced into fixed-size blocks; every
//! complete block is posted to the dispatcher, which encodes it and hands it
//! to the session transport in capture order.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler};

use crate::events::{self, Event, EventSender, SessionId};
use crate::voice::codec::{self, EncodedChunk};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Default capture block (100ms at 16kHz)
pub const DEFAULT_BLOCK_FRAMES: usize = 1600;

/// Input chunk handed to the FFT resampler
const RESAMPLE_CHUNK: usize = 1024;

/// Microphone device seam
///
/// Implementations own the input clock domain. `acquire` corresponds to
/// requesting microphone access and may be denied; `stop` releases the
/// hardware and must be safe to call repeatedly.
pub trait AudioInput {
    /// Request access to the input device
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAccess` if permission is denied or no device exists
    fn acquire(&mut self) -> Result<()>;

    /// Start streaming captured samples into `sink`
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    fn start(&mut self, sink: BlockSink) -> Result<()>;

    /// Stop capture, detach the callback and release the device
    fn stop(&mut self);

    /// Whether an input stream is running
    fn is_capturing(&self) -> bool;
}

/// Slices a continuous sample stream into fixed-size blocks
///
/// Never holds more than one partial block.
#[derive(Debug)]
pub struct BlockFramer {
    block_frames: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    /// Create a framer emitting blocks of `block_frames` samples
    #[must_use]
    pub fn new(block_frames: usize) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            block_frames,
            pending: Vec::with_capacity(block_frames),
        }
    }

    /// Append samples, calling `emit` for each completed block in order
    pub fn push(&mut self, mut data: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        while !data.is_empty() {
            let take = (self.block_frames - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.block_frames {
                let block = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.block_frames),
                );
                emit(block);
            }
        }
    }

    /// Samples waiting for the next block
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Block size in samples
    #[must_use]
    pub const fn block_frames(&self) -> usize {
        self.block_frames
    }
}

/// Destination for captured audio, moved into the device callback
///
/// Frames incoming samples and posts each block as a `CaptureBlock` event
/// tagged with the owning session. Posting never blocks and never fails.
#[derive(Debug)]
pub struct BlockSink {
    session: SessionId,
    events: EventSender,
    framer: BlockFramer,
}

impl BlockSink {
    /// Create a sink for `session`
    #[must_use]
    pub fn new(session: SessionId, events: EventSender, block_frames: usize) -> Self {
        Self {
            session,
            events,
            framer: BlockFramer::new(block_frames),
        }
    }

    /// Feed 16kHz mono samples
    pub fn push(&mut self, data: &[f32]) {
        let session = self.session;
        let events = &self.events;
        self.framer.push(data, |samples| {
            events::post(events, Event::CaptureBlock { session, samples });
        });
    }

    /// Session this sink belongs to
    #[must_use]
    pub const fn session(&self) -> SessionId {
        self.session
    }
}

/// Owns the microphone for the lifetime of a session
pub struct CapturePipeline {
    input: Box<dyn AudioInput>,
    block_frames: usize,
    acquired: bool,
    blocks_encoded: u64,
}

impl CapturePipeline {
    /// Create a pipeline around an input device
    #[must_use]
    pub fn new(input: Box<dyn AudioInput>, block_frames: usize) -> Self {
        Self {
            input,
            block_frames,
            acquired: false,
            blocks_encoded: 0,
        }
    }

    /// Request microphone access
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceAccess` if the device is denied or unavailable
    pub fn acquire(&mut self) -> Result<()> {
        self.input.acquire().map_err(|e| match e {
            Error::DeviceAccess(_) => e,
            other => Error::DeviceAccess(other.to_string()),
        })?;
        self.acquired = true;
        tracing::debug!("microphone acquired");
        Ok(())
    }

    /// Begin streaming blocks for `session`
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self, session: SessionId, events: EventSender) -> Result<()> {
        if self.input.is_capturing() {
            return Ok(());
        }

        self.input
            .start(BlockSink::new(session, events, self.block_frames))?;
        self.blocks_encoded = 0;

        tracing::info!(
            session = %session,
            block_frames = self.block_frames,
            sample_rate = SAMPLE_RATE,
            "audio capture started"
        );
        Ok(())
    }

    /// Encode one captured block for the transport
    pub fn encode_block(&mut self, samples: &[f32]) -> EncodedChunk {
        self.blocks_encoded += 1;
        codec::encode_frame(samples, SAMPLE_RATE)
    }

    /// Stop capture and release the device; a no-op when already stopped
    pub fn stop(&mut self) {
        if !self.acquired && !self.input.is_capturing() {
            return;
        }

        self.input.stop();
        self.acquired = false;
        tracing::debug!(blocks = self.blocks_encoded, "audio capture stopped");
    }

    /// Whether microphone access is currently held
    #[must_use]
    pub const fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Whether the input stream is running
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.input.is_capturing()
    }

    /// Blocks encoded since capture started
    #[must_use]
    pub const fn blocks_encoded(&self) -> u64 {
        self.blocks_encoded
    }
}

/// Captures audio from the default input device
pub struct CpalInput {
    device: Option<Device>,
    config: Option<StreamConfig>,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl CpalInput {
    /// Create an input that has not yet requested the device
    #[must_use]
    pub const fn new() -> Self {
        Self {
            device: None,
            config: None,
            sample_format: SampleFormat::F32,
            stream: None,
        }
    }
}

impl Default for CpalInput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInput for CpalInput {
    fn acquire(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceAccess("no input device available".to_string()))?;

        let (config, sample_format) = select_input_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            ?sample_format,
            "audio capture initialized"
        );

        self.device = Some(device);
        self.config = Some(config);
        self.sample_format = sample_format;
        Ok(())
    }

    fn start(&mut self, sink: BlockSink) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::DeviceAccess("microphone not acquired".to_string()))?;
        let config = self
            .config
            .clone()
            .ok_or_else(|| Error::DeviceAccess("microphone not acquired".to_string()))?;

        let converter = CaptureConverter::new(config.sample_rate.0, SAMPLE_RATE)?;

        let stream = match self.sample_format {
            SampleFormat::F32 => build_input::<f32>(device, &config, sink, converter),
            SampleFormat::I16 => build_input::<i16>(device, &config, sink, converter),
            SampleFormat::U16 => build_input::<u16>(device, &config, sink, converter),
            other => Err(Error::DeviceAccess(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| Error::DeviceAccess(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "failed to pause input stream");
            }
            drop(stream);
        }
        self.device = None;
        self.config = None;
    }

    fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Prefer a native 16kHz mono config, else the device default
fn select_input_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
    let preferred = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceAccess(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        });

    if let Some(range) = preferred {
        let sample_format = range.sample_format();
        return Ok((range.with_sample_rate(SampleRate(SAMPLE_RATE)).config(), sample_format));
    }

    let fallback = device
        .default_input_config()
        .map_err(|e| Error::DeviceAccess(e.to_string()))?;
    tracing::debug!(
        sample_rate = fallback.sample_rate().0,
        channels = fallback.channels(),
        "no native 16kHz mono config, converting in software"
    );
    Ok((fallback.config(), fallback.sample_format()))
}

fn build_input<T>(
    device: &Device,
    config: &StreamConfig,
    mut sink: BlockSink,
    mut converter: CaptureConverter,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let mono = downmix(data, channels);
                converter.process(&mono, |samples| sink.push(samples));
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::DeviceAccess(e.to_string()))
}

/// Average interleaved frames into a mono float signal
#[allow(clippy::cast_precision_loss)]
fn downmix<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    if channels == 1 {
        return data.iter().map(|&s| f32::from_sample(s)).collect();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Converts device-rate mono audio to the capture rate
struct CaptureConverter {
    resampler: Option<FftFixedIn<f32>>,
    pending: Vec<f32>,
    chunk: usize,
}

impl CaptureConverter {
    fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == target_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                chunk: 0,
            });
        }

        let resampler = FftFixedIn::<f32>::new(
            source_rate as usize,
            target_rate as usize,
            RESAMPLE_CHUNK,
            2,
            1,
        )
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;
        let chunk = resampler.input_frames_next();

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(chunk * 2),
            chunk,
        })
    }

    fn process(&mut self, mono: &[f32], mut emit: impl FnMut(&[f32])) {
        let Some(resampler) = self.resampler.as_mut() else {
            emit(mono);
            return;
        };

        self.pending.extend_from_slice(mono);
        while self.pending.len() >= self.chunk {
            let input: Vec<f32> = self.pending.drain(..self.chunk).collect();
            match resampler.process(&[input], None) {
                Ok(output) => {
                    if let Some(channel) = output.first() {
                        emit(channel);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "capture resample failed"),
            }
        }
    }
}

/// Root-mean-square level of a block
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to 16-bit WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(codec::float_to_pcm16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
