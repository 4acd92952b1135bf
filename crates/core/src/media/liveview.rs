//! Live-view stream reader.
//!
//! Two tasks per stream:
//!
//! ```text
//! HTTP body ──> reader (MjpegExtractor) ──[bounded queue]──> decoder ──> FrameSink
//!                                              │
//!                                   full: newest frame dropped
//! ```
//!
//! The reader never waits on the decoder, so a slow sink costs frames
//! rather than socket backpressure. Decoding runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use image::{GenericImageView, ImageFormat};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{FrameSink, LiveFrame, MjpegExtractor};
use crate::error::{CameraError, Result, TransportError};

/// Extracted frames waiting for the decoder.
pub const FRAME_QUEUE_DEPTH: usize = 4;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct ActiveStream {
    url: String,
    reader: JoinHandle<()>,
    decoder: JoinHandle<()>,
}

/// Owner of at most one running preview stream.
pub struct LiveViewStream {
    client: reqwest::Client,
    active: Mutex<Option<ActiveStream>>,
}

impl LiveViewStream {
    pub fn new() -> Self {
        // No overall timeout: the response body never ends on its own.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            active: Mutex::new(None),
        }
    }

    /// Open `url` and start delivering frames to `sink`. A stream that is
    /// already running is stopped first.
    pub async fn start(&self, url: &str, sink: Arc<dyn FrameSink>) -> Result<()> {
        self.stop();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()).into());
        }

        let (tx, rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let reader = tokio::spawn(read_frames(response, tx));
        let decoder = tokio::spawn(decode_frames(rx, sink));

        let previous = self.active.lock().replace(ActiveStream {
            url: url.to_string(),
            reader,
            decoder,
        });
        if let Some(previous) = previous {
            previous.reader.abort();
            previous.decoder.abort();
        }

        tracing::info!(url, "live view started");
        Ok(())
    }

    /// Abort both tasks and drop the connection. Returns whether a stream
    /// was running.
    pub fn stop(&self) -> bool {
        match self.active.lock().take() {
            Some(stream) => {
                stream.reader.abort();
                stream.decoder.abort();
                tracing::info!(url = %stream.url, "live view stopped");
                true
            }
            None => false,
        }
    }

    /// True while the reader is still receiving the body.
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|s| !s.reader.is_finished())
    }
}

impl Default for LiveViewStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LiveViewStream {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_frames(mut response: reqwest::Response, frames: mpsc::Sender<Bytes>) {
    let mut extractor = MjpegExtractor::new();
    let mut dropped = 0u64;

    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                for frame in extractor.push(&chunk) {
                    match frames.try_send(frame) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            dropped += 1;
                            tracing::trace!(dropped, "decoder behind, frame dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => return,
                    }
                }
            }
            Ok(None) => {
                tracing::info!(dropped, "live view stream ended");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, dropped, "live view read failed");
                return;
            }
        }
    }
}

async fn decode_frames(mut frames: mpsc::Receiver<Bytes>, sink: Arc<dyn FrameSink>) {
    let mut sequence = 0u64;

    while let Some(jpeg) = frames.recv().await {
        let seq = sequence;
        match tokio::task::spawn_blocking(move || decode_frame(seq, jpeg)).await {
            Ok(Ok(frame)) => {
                sequence += 1;
                sink.on_frame(frame);
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "dropping corrupt frame"),
            Err(e) => tracing::warn!(error = %e, "frame decode task failed"),
        }
    }
}

/// Decode `jpeg` far enough to learn its dimensions.
pub fn decode_frame(sequence: u64, jpeg: Bytes) -> Result<LiveFrame> {
    let image = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
        .map_err(|e| CameraError::StreamDecode(e.to_string()))?;
    let (width, height) = image.dimensions();
    Ok(LiveFrame {
        sequence,
        jpeg,
        width,
        height,
    })
}
