//! JPEG frame extraction from a raw MJPEG byte stream.
//!
//! No multipart boundaries or length headers are trusted. Frames are found
//! purely by their markers:
//!
//! ```text
//! ... junk ... FF D8 <jpeg body> FF D9 ... junk ... FF D8 <jpeg body> FF D9
//!              \_____ frame 1 ________/             \_____ frame 2 ________/
//! ```
//!
//! The extractor keeps the previous byte between calls, so a marker split
//! across two reads is still found.

use bytes::{BufMut, Bytes, BytesMut};

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;

/// Frames larger than this are discarded as corrupt.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Incremental SOI/EOI frame splitter.
#[derive(Debug)]
pub struct MjpegExtractor {
    frame: BytesMut,
    in_image: bool,
    prev: Option<u8>,
    max_frame_len: usize,
}

impl MjpegExtractor {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            frame: BytesMut::with_capacity(64 * 1024),
            in_image: false,
            prev: None,
            max_frame_len,
        }
    }

    /// Feed one read's worth of bytes; returns every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();

        for &byte in chunk {
            let after_marker = self.prev == Some(MARKER);

            if self.in_image {
                self.frame.put_u8(byte);
                if after_marker && byte == EOI {
                    frames.push(self.frame.split().freeze());
                    self.in_image = false;
                } else if self.frame.len() > self.max_frame_len {
                    tracing::warn!(
                        max = self.max_frame_len,
                        "no end marker within frame limit, resyncing"
                    );
                    self.frame.clear();
                    self.in_image = false;
                }
            } else if after_marker && byte == SOI {
                self.frame.clear();
                self.frame.put_slice(&[MARKER, SOI]);
                self.in_image = true;
            }

            self.prev = Some(byte);
        }

        frames
    }

    /// Bytes buffered for a frame that has not ended yet.
    pub fn pending_len(&self) -> usize {
        if self.in_image { self.frame.len() } else { 0 }
    }
}

impl Default for MjpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}
