use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::audio::{AudioChunk, AudioInput, AudioInterface};
use crate::error::RelayError;
use crate::telemetry::events::record_output_dropped;
use crate::util::lock;

use super::{MediaPayload, StreamBinding, TransportEnvelope, TransportSink};

const TARGET: &str = "telephony_audio";
const ADAPTER: &str = "telephony";

/// [`AudioInterface`] over a telephony media stream.
///
/// Inbound envelopes are fed through [`handle_envelope`](Self::handle_envelope);
/// output audio and clear signals go straight back out through the sink.
pub struct TelephonyAudioInterface {
    sink: Arc<dyn TransportSink>,
    binding: Mutex<Option<StreamBinding>>,
    input: Mutex<Option<AudioInput>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl TelephonyAudioInterface {
    pub fn new(sink: Arc<dyn TransportSink>) -> Self {
        Self {
            sink,
            binding: Mutex::new(None),
            input: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn stream_binding(&self) -> Option<StreamBinding> {
        lock(&self.binding).clone()
    }

    pub fn handle_envelope(&self, envelope: TransportEnvelope) {
        match envelope {
            TransportEnvelope::Start { start } => {
                info!(
                    target: TARGET,
                    stream_sid = %start.stream_sid,
                    "media stream started"
                );
                *lock(&self.binding) = Some(start.stream_sid);
            }
            TransportEnvelope::Media { media, .. } => self.handle_media(media),
            TransportEnvelope::Stop { .. } => {
                info!(target: TARGET, "media stream stopped by transport");
            }
            other => {
                debug!(target: TARGET, event = other.label(), "ignoring transport event");
            }
        }
    }

    fn handle_media(&self, media: MediaPayload) {
        let chunk = match AudioChunk::from_base64(&media.payload) {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(target: TARGET, %err, "dropping media frame");
                return;
            }
        };

        let input = lock(&self.input);
        match input.as_ref() {
            Some(handle) => handle.deliver(chunk),
            None => debug!(
                target: TARGET,
                bytes = chunk.len(),
                "dropping media received before start"
            ),
        }
    }

    fn send_envelope(&self, envelope: &TransportEnvelope) -> Result<(), RelayError> {
        if !self.sink.is_open() {
            return Err(RelayError::ChannelClosed);
        }
        let frame = serde_json::to_string(envelope)
            .map_err(|err| RelayError::malformed(format!("encode {}: {err}", envelope.label())))?;
        self.sink.send(frame)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Started and not yet stopped.
    fn is_ready(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.is_stopped()
    }
}

#[async_trait]
impl AudioInterface for TelephonyAudioInterface {
    async fn start(&self, input: AudioInput) -> Result<()> {
        if self.is_stopped() {
            return Err(anyhow!(RelayError::CapabilityNotReady));
        }
        *lock(&self.input) = Some(input);
        self.started.store(true, Ordering::SeqCst);
        debug!(target: TARGET, "telephony audio started");
        Ok(())
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.input).take();
        lock(&self.binding).take();
        info!(target: TARGET, "stopping audio processing");
    }

    fn output(&self, chunk: AudioChunk) {
        if !self.is_ready() {
            debug!(
                target: TARGET,
                err = %RelayError::CapabilityNotReady,
                "ignoring output"
            );
            return;
        }

        let bytes = chunk.len();
        let envelope = TransportEnvelope::Media {
            media: MediaPayload {
                payload: chunk.to_base64(),
            },
            stream_sid: self.stream_binding(),
        };

        if let Err(err) = self.send_envelope(&envelope) {
            warn!(target: TARGET, %err, "failed to send audio to transport");
            record_output_dropped(ADAPTER, err.kind(), bytes);
        }
    }

    fn interrupt(&self) {
        if !self.is_ready() {
            debug!(
                target: TARGET,
                err = %RelayError::CapabilityNotReady,
                "ignoring interrupt"
            );
            return;
        }
        let Some(stream_sid) = self.stream_binding() else {
            debug!(target: TARGET, "no stream bound, skipping clear");
            return;
        };

        if let Err(err) = self.send_envelope(&TransportEnvelope::Clear { stream_sid }) {
            warn!(target: TARGET, %err, "failed to send clear message to transport");
        }
    }
}
