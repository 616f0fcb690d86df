//! Local device binding: an injected capture backend feeds [`CaptureFeed`],
//! and queued output is drained into an injected [`PlaybackSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::telemetry::events::record_output_dropped;
use crate::util::lock;

use super::queue::{OutputQueue, DEFAULT_QUEUE_CAPACITY};
use super::{AudioChunk, AudioInput, AudioInterface, BYTES_PER_SAMPLE};

const TARGET: &str = "device_audio";
const ADAPTER: &str = "device";

/// Playback side of a local audio backend.
pub trait PlaybackSink: Send + Sync {
    /// Hands one chunk to the device. Must not block; it runs while the
    /// output queue is locked.
    fn play(&self, chunk: &AudioChunk) -> Result<()>;

    /// Releases the device. Called once from `stop`.
    fn close(&self) {}
}

#[derive(Debug, Clone)]
pub struct DeviceAudioConfig {
    pub queue_capacity: usize,
    /// Upper bound between drain passes when no wake-up arrives.
    pub drain_interval: Duration,
    /// Output chunks are split into pieces of at most this many samples.
    pub output_frames_per_buffer: usize,
}

impl Default for DeviceAudioConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            drain_interval: Duration::from_millis(10),
            output_frames_per_buffer: 1_000,
        }
    }
}

struct DeviceShared {
    config: DeviceAudioConfig,
    queue: Mutex<OutputQueue>,
    input: Mutex<Option<AudioInput>>,
    sink: Arc<dyn PlaybackSink>,
    wake: Notify,
    running: AtomicBool,
    stopped: AtomicBool,
}

impl DeviceShared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    fn deliver_next(&self) -> bool {
        let mut queue = lock(&self.queue);
        let Some(chunk) = queue.get() else {
            return false;
        };

        if let Err(err) = self.sink.play(&chunk) {
            warn!(
                target: TARGET,
                %err,
                bytes = chunk.len(),
                "playback sink rejected audio chunk"
            );
        }
        true
    }
}

/// [`AudioInterface`] for a local speaker/microphone pair.
pub struct DeviceAudioInterface {
    shared: Arc<DeviceShared>,
}

impl DeviceAudioInterface {
    pub fn new(config: DeviceAudioConfig, sink: Arc<dyn PlaybackSink>) -> Self {
        let queue = OutputQueue::new(config.queue_capacity);
        Self {
            shared: Arc::new(DeviceShared {
                config,
                queue: Mutex::new(queue),
                input: Mutex::new(None),
                sink,
                wake: Notify::new(),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Handle the capture backend pushes microphone audio into.
    pub fn capture_feed(&self) -> CaptureFeed {
        CaptureFeed {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn pending_output(&self) -> usize {
        lock(&self.shared.queue).len()
    }

    fn split_output(&self, chunk: AudioChunk) -> Vec<AudioChunk> {
        let max_bytes = self.shared.config.output_frames_per_buffer.max(1) * BYTES_PER_SAMPLE;
        if chunk.len() <= max_bytes {
            return vec![chunk];
        }

        let bytes = chunk.into_bytes();
        (0..bytes.len())
            .step_by(max_bytes)
            .filter_map(|start| {
                let end = (start + max_bytes).min(bytes.len());
                AudioChunk::new(bytes.slice(start..end)).ok()
            })
            .collect()
    }
}

async fn drain_output(shared: Arc<DeviceShared>) {
    debug!(target: TARGET, "output drain loop started");
    while !shared.stopped.load(Ordering::SeqCst) {
        if shared.deliver_next() {
            tokio::task::yield_now().await;
            continue;
        }
        let _ = timeout(shared.config.drain_interval, shared.wake.notified()).await;
    }
    debug!(target: TARGET, "output drain loop finished");
}

#[async_trait]
impl AudioInterface for DeviceAudioInterface {
    async fn start(&self, input: AudioInput) -> Result<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(anyhow!(RelayError::CapabilityNotReady));
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!(target: TARGET, "device audio already started");
            return Ok(());
        }

        *lock(&self.shared.input) = Some(input);
        tokio::spawn(drain_output(Arc::clone(&self.shared)));
        info!(
            target: TARGET,
            capacity = self.shared.config.queue_capacity,
            "device audio started"
        );
        Ok(())
    }

    fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        lock(&self.shared.input).take();
        lock(&self.shared.queue).clear();
        self.shared.wake.notify_one();
        self.shared.sink.close();
        info!(target: TARGET, "device audio stopped");
    }

    fn output(&self, chunk: AudioChunk) {
        if !self.shared.is_running() {
            debug!(
                target: TARGET,
                err = %RelayError::CapabilityNotReady,
                "ignoring output"
            );
            return;
        }

        let pieces = self.split_output(chunk);
        let mut queue = lock(&self.shared.queue);
        for piece in pieces {
            let bytes = piece.len();
            if let Err(err) = queue.put(piece) {
                record_output_dropped(ADAPTER, err.kind(), bytes);
                break;
            }
        }
        drop(queue);
        self.shared.wake.notify_one();
    }

    fn interrupt(&self) {
        if !self.shared.is_running() {
            debug!(
                target: TARGET,
                err = %RelayError::CapabilityNotReady,
                "ignoring interrupt"
            );
            return;
        }

        let mut queue = lock(&self.shared.queue);
        let discarded = queue.len();
        queue.clear();
        drop(queue);
        self.shared.wake.notify_one();
        debug!(target: TARGET, discarded, "output queue cleared");
    }
}

/// Cloneable handle for the capture backend. Chunks pushed before `start` or
/// after `stop` are dropped.
#[derive(Clone)]
pub struct CaptureFeed {
    shared: Arc<DeviceShared>,
}

impl CaptureFeed {
    pub fn push(&self, chunk: AudioChunk) -> bool {
        let input = lock(&self.shared.input);
        match input.as_ref() {
            Some(handle) => {
                handle.deliver(chunk);
                true
            }
            None => false,
        }
    }
}
