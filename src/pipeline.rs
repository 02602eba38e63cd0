//! Acquisition pipeline: one producer thread per source feeding a bounded
//! drop-oldest `FrameBuffer`, read by a single analytics consumer.
//!
//! Only the acquisition thread pushes; only the consumer pops. `read` is the
//! sole blocking point on the consumer side, and a timeout with no data is
//! how the consumer learns the source is exhausted.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::frame::{Frame, FrameBuffer, FrameShape, DEFAULT_BUFFER_CAPACITY};
use crate::ingest::FrameSource;

/// Counters shared between the acquisition thread and the consumer.
#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    dropped: AtomicU64,
    finished: AtomicBool,
}

/// Snapshot of pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_acquired: u64,
    pub frames_dropped: u64,
    pub frames_buffered: usize,
    pub acquisition_finished: bool,
}

/// Owns a started source on the acquisition thread. Dropping it releases the
/// source, so every exit path (end of stream, error, stop, panic) releases
/// exactly once.
struct SourceGuard(Box<dyn FrameSource>);

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

pub struct FramePipeline {
    source: Option<Box<dyn FrameSource>>,
    shape: FrameShape,
    buffer: Arc<FrameBuffer<Frame>>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
    join: Option<JoinHandle<()>>,
}

impl FramePipeline {
    pub fn new<S: FrameSource + 'static>(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity<S: FrameSource + 'static>(source: S, capacity: usize) -> Self {
        Self::from_boxed(Box::new(source), capacity)
    }

    pub fn from_boxed(source: Box<dyn FrameSource>, capacity: usize) -> Self {
        let shape = source.frame_shape();
        Self {
            source: Some(source),
            shape,
            buffer: Arc::new(FrameBuffer::with_capacity(capacity)),
            shutdown: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
            join: None,
        }
    }

    /// Open the source and spawn the acquisition thread.
    ///
    /// Open failures are returned to the caller after the source has been
    /// released.
    pub fn start(&mut self) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| anyhow!("frame pipeline already started"))?;
        if let Err(err) = source.open() {
            source.release();
            return Err(err);
        }

        let guard = SourceGuard(source);
        let buffer = self.buffer.clone();
        let shutdown = self.shutdown.clone();
        let counters = self.counters.clone();
        let join = std::thread::Builder::new()
            .name("frame-acquisition".to_string())
            .spawn(move || acquire_frames(guard, &buffer, &shutdown, &counters))?;
        self.join = Some(join);
        log::info!(
            "frame pipeline started ({}x{}, buffer capacity {})",
            self.shape.width,
            self.shape.height,
            self.buffer.capacity()
        );
        Ok(())
    }

    /// Wait up to `timeout` for the next frame. `None` means no data.
    pub fn read(&self, timeout: Duration) -> Option<Frame> {
        self.buffer.pop_timeout(timeout)
    }

    /// Signal the acquisition thread, join it, and discard buffered frames.
    ///
    /// Safe to call repeatedly and before `start`.
    pub fn stop(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        let joined = join.join();
        self.buffer.clear();
        log::info!(
            "frame pipeline stopped (acquired={}, dropped={})",
            self.counters.acquired.load(Ordering::SeqCst),
            self.counters.dropped.load(Ordering::SeqCst)
        );
        joined.map_err(|_| anyhow!("frame acquisition thread panicked"))
    }

    pub fn frame_shape(&self) -> FrameShape {
        self.shape
    }

    pub fn is_running(&self) -> bool {
        self.join.is_some() && !self.counters.finished.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_acquired: self.counters.acquired.load(Ordering::SeqCst),
            frames_dropped: self.counters.dropped.load(Ordering::SeqCst),
            frames_buffered: self.buffer.len(),
            acquisition_finished: self.counters.finished.load(Ordering::SeqCst),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("frame pipeline shutdown failed: {}", err);
        }
    }
}

fn acquire_frames(
    mut guard: SourceGuard,
    buffer: &FrameBuffer<Frame>,
    shutdown: &AtomicBool,
    counters: &Counters,
) {
    while !shutdown.load(Ordering::SeqCst) {
        if !guard.0.is_healthy() {
            log::error!(
                "frame source {} unhealthy after {} frames, stopping acquisition",
                guard.0.stats().path,
                counters.acquired.load(Ordering::SeqCst)
            );
            break;
        }
        match guard.0.next_frame() {
            Ok(Some(frame)) => {
                counters.acquired.fetch_add(1, Ordering::SeqCst);
                if let Some(evicted) = buffer.push(frame) {
                    counters.dropped.fetch_add(1, Ordering::SeqCst);
                    log::debug!("frame buffer full, dropped frame {}", evicted.index);
                }
            }
            Ok(None) => {
                log::info!(
                    "frame source {} exhausted after {} frames",
                    guard.0.stats().path,
                    counters.acquired.load(Ordering::SeqCst)
                );
                break;
            }
            Err(err) => {
                log::error!("frame acquisition failed: {}", err);
                break;
            }
        }
    }
    counters.finished.store(true, Ordering::SeqCst);
    drop(guard);
}

// ----------------------------------------------------------------------------
// Multi-camera fan-in
// ----------------------------------------------------------------------------

/// A set of named pipelines started and stopped together.
#[derive(Default)]
pub struct MultiCameraPipeline {
    pipelines: BTreeMap<String, FramePipeline>,
}

impl MultiCameraPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, camera_id: impl Into<String>, pipeline: FramePipeline) {
        self.pipelines.insert(camera_id.into(), pipeline);
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    /// Start every pipeline. On failure the already-started ones are stopped.
    pub fn start_all(&mut self) -> Result<()> {
        let mut failure = None;
        for (id, pipeline) in self.pipelines.iter_mut() {
            if let Err(err) = pipeline.start() {
                failure = Some(anyhow!("camera {} failed to start: {}", id, err));
                break;
            }
        }
        if let Some(err) = failure {
            self.stop_all()?;
            return Err(err);
        }
        Ok(())
    }

    /// Stop every pipeline, reporting the first failure after all were stopped.
    pub fn stop_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for (id, pipeline) in self.pipelines.iter_mut() {
            if let Err(err) = pipeline.stop() {
                log::error!("camera {} failed to stop: {}", id, err);
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// One read per camera; cameras without data within `timeout` are omitted.
    pub fn read_all(&self, timeout: Duration) -> BTreeMap<String, Frame> {
        self.pipelines
            .iter()
            .filter_map(|(id, pipeline)| pipeline.read(timeout).map(|f| (id.clone(), f)))
            .collect()
    }
}
