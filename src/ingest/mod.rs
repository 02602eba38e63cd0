//! Frame ingestion sources.
//!
//! This module provides sources for raw frames:
//! - Local raw RGB8 frame dumps (`FileSource`)
//! - Synthetic `stub://` scenes (testing, demos)
//!
//! Every source follows the same lifecycle: `open()` acquires the underlying
//! capture resource, `next_frame()` yields frames until end of stream
//! (`Ok(None)`), and `release()` gives the resource back. `FramePipeline`
//! guarantees `release()` is called exactly once per started source.
//!
//! Sources do not retry or reconnect. A source that stops yielding frames is
//! treated as exhausted.

use anyhow::Result;

use crate::frame::{Frame, FrameShape};

pub mod file;

pub use file::{FileConfig, FileSource};

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub path: String,
}

/// A producer of frames at the source's native rate.
pub trait FrameSource: Send {
    /// Acquire the capture resource.
    fn open(&mut self) -> Result<()>;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the capture resource. Must tolerate a source that was never
    /// opened.
    fn release(&mut self);

    /// Shape of the frames this source produces.
    fn frame_shape(&self) -> FrameShape;

    /// Checked before every read. `false` ends acquisition like end of
    /// stream.
    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}
