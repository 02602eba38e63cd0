//! Frame container and the bounded hand-off buffer.
//!
//! - `Frame`: one decoded RGB8 image plus its capture index.
//! - `FrameBuffer`: fixed-capacity queue between the acquisition thread and
//!   the analytics loop. When full, the producer drops the oldest frame
//!   before inserting (freshness over completeness).

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default frame buffer capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Default consumer wait in `FrameBuffer::pop_timeout`.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Bytes per pixel for the RGB8 frame layout.
pub const RGB_CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
}

impl FrameShape {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * RGB_CHANNELS
    }
}

impl Default for FrameShape {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A single RGB8 frame, row-major, no padding.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic index assigned by the source (0-based).
    pub index: u64,
    capture_instant: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = FrameShape::new(width, height).byte_len();
        if data.len() != expected {
            return Err(anyhow!(
                "frame {} has {} bytes, expected {} for {}x{} RGB8",
                index,
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            index,
            capture_instant: Instant::now(),
        })
    }

    /// Uniform black frame, handy for detector-only pipelines.
    pub fn blank(shape: FrameShape, index: u64) -> Self {
        Self {
            data: vec![0u8; shape.byte_len()],
            width: shape.width,
            height: shape.height,
            index,
            capture_instant: Instant::now(),
        }
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Time since capture, including time spent buffered.
    pub fn age(&self) -> Duration {
        self.capture_instant.elapsed()
    }

    /// Luma conversion used by the contour-based spot detector.
    pub fn to_gray(&self) -> Result<GrayImage> {
        let rgb = RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame {} buffer does not match its shape", self.index))?;
        Ok(image::imageops::grayscale(&rgb))
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer: bounded drop-oldest queue
// ----------------------------------------------------------------------------

/// Bounded single-producer/single-consumer frame queue.
///
/// - `push` never blocks. At capacity it evicts the oldest frame first.
/// - `pop_timeout` blocks the consumer until a frame arrives or the timeout
///   elapses.
///
/// Generic over the payload so the eviction policy can be exercised without
/// pixel data.
pub struct FrameBuffer<T = Frame> {
    queue: Mutex<VecDeque<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> FrameBuffer<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a buffer holding at most `capacity` items (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            available: Condvar::new(),
            capacity,
        }
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut queue = self.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(item);
            evicted
        };
        self.available.notify_one();
        evicted
    }

    /// Non-blocking pop.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Wait up to `timeout` for the oldest buffered item.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .available
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            queue = guard;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T> Default for FrameBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
