//! Live-view preview: MJPEG frame extraction and the stream reader.
//!
//! The camera's preview is one endless HTTP response body of concatenated
//! JPEG images. [`mjpeg::MjpegExtractor`] cuts it into frames on the JPEG
//! SOI/EOI markers; [`liveview::LiveViewStream`] owns the connection and
//! the tasks that read, decode and deliver frames to a [`FrameSink`].

pub mod liveview;
pub mod mjpeg;

use bytes::Bytes;

pub use liveview::LiveViewStream;
pub use mjpeg::MjpegExtractor;

/// One decoded preview frame.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    /// Position among delivered frames, starting at 0.
    pub sequence: u64,
    /// The complete JPEG, SOI to EOI inclusive.
    pub jpeg: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Receives frames from the decode task.
///
/// Called on a tokio worker, so implementations should hand the frame off
/// rather than render in place. Any `Fn(LiveFrame)` closure works:
///
/// ```
/// use std::sync::Arc;
/// use camctl::media::{FrameSink, LiveFrame};
///
/// let sink: Arc<dyn FrameSink> = Arc::new(|frame: LiveFrame| {
///     println!("frame {} {}x{}", frame.sequence, frame.width, frame.height);
/// });
/// ```
pub trait FrameSink: Send + Sync + 'static {
    fn on_frame(&self, frame: LiveFrame);
}

impl<F> FrameSink for F
where
    F: Fn(LiveFrame) + Send + Sync + 'static,
{
    fn on_frame(&self, frame: LiveFrame) {
        self(frame)
    }
}
