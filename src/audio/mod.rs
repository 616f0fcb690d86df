//! 双工音频端口抽象与 PCM 音频块。

pub mod device;
pub mod queue;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;

use crate::error::RelayError;

pub use device::{CaptureFeed, DeviceAudioConfig, DeviceAudioInterface, PlaybackSink};
pub use queue::{OutputQueue, DEFAULT_QUEUE_CAPACITY};

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const BYTES_PER_SAMPLE: usize = 2;

/// 16-bit signed little-endian PCM, mono, 16 kHz. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioChunk {
    data: Bytes,
}

impl AudioChunk {
    pub fn new<B: Into<Bytes>>(data: B) -> Result<Self, RelayError> {
        let data = data.into();
        if data.is_empty() {
            return Err(RelayError::malformed("audio chunk is empty"));
        }
        Ok(Self { data })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, RelayError> {
        let decoded = BASE64_STANDARD
            .decode(encoded.trim())
            .map_err(|err| RelayError::malformed(format!("invalid base64 audio: {err}")))?;
        Self::new(decoded)
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / BYTES_PER_SAMPLE
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.sample_count() as f64 / SAMPLE_RATE_HZ as f64)
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioChunk")
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Handle through which an audio interface hands captured user audio to the
/// session. Passed once to [`AudioInterface::start`].
#[derive(Clone)]
pub struct AudioInput {
    deliver: Arc<dyn Fn(AudioChunk) + Send + Sync>,
}

impl AudioInput {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(AudioChunk) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn deliver(&self, chunk: AudioChunk) {
        (self.deliver)(chunk)
    }
}

impl fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioInput").finish_non_exhaustive()
    }
}

/// Duplex audio port driven by a conversation.
///
/// `start` is called once before any audio flows and `stop` once after the
/// session ends. `output` and `interrupt` must return quickly and never fail
/// towards the caller; calls made before `start` or after `stop` are ignored.
#[async_trait]
pub trait AudioInterface: Send + Sync {
    async fn start(&self, input: AudioInput) -> Result<()>;

    /// No input is delivered once this returns. Safe to call twice.
    fn stop(&self);

    fn output(&self, chunk: AudioChunk);

    /// Drops every output chunk that has not reached the user yet.
    fn interrupt(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn rejects_empty_chunk() {
        assert_eq!(
            AudioChunk::new(Vec::<u8>::new()),
            Err(RelayError::malformed("audio chunk is empty"))
        );
    }

    #[test]
    fn base64_payload_decodes_to_pcm() {
        let chunk = AudioChunk::from_base64("AAEC/w==").expect("valid payload");
        assert_eq!(chunk.as_bytes(), &[0x00, 0x01, 0x02, 0xff]);
        assert_eq!(chunk.to_base64(), "AAEC/w==");
    }

    #[test]
    fn invalid_base64_is_malformed() {
        let err = AudioChunk::from_base64("not base64!").expect_err("decode fails");
        assert_eq!(err.kind(), "malformed_frame");
    }

    #[test]
    fn duration_follows_sample_rate() {
        let chunk = AudioChunk::new(vec![0_u8; 4_000 * BYTES_PER_SAMPLE]).expect("chunk");
        assert_eq!(chunk.sample_count(), 4_000);
        assert_eq!(chunk.duration(), Duration::from_millis(250));
    }

    #[test]
    fn input_handle_forwards_chunks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let input = AudioInput::new(move |chunk: AudioChunk| {
            sink.lock().expect("seen lock poisoned").push(chunk.len());
        });

        input.deliver(AudioChunk::new(vec![1_u8, 2]).expect("chunk"));
        input.clone().deliver(AudioChunk::new(vec![3_u8; 6]).expect("chunk"));

        assert_eq!(*seen.lock().expect("seen lock poisoned"), vec![2, 6]);
    }
}
