//! Voice processing module
//!
//! Handles microphone capture, the PCM codec, and gapless playback of
//! remote speech. The two audio clock domains live here: the input device
//! clock driving capture callbacks and the output clock that playback
//! buffers are scheduled against.

pub mod capture;
pub mod codec;
pub mod playback;
pub mod timeline;

pub use capture::{
    AudioInput, BlockFramer, BlockSink, CapturePipeline, CpalInput, DEFAULT_BLOCK_FRAMES,
    SAMPLE_RATE, rms, samples_to_wav,
};
pub use codec::{AudioBuffer, DecodeError, EncodedChunk, decode_chunk, encode_frame};
pub use playback::{
    AudioOutput, CpalOutput, PLAYBACK_SAMPLE_RATE, PlaybackScheduler, ScheduledBuffer,
};
pub use timeline::Timeline;
