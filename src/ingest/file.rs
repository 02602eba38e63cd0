//! Local file frame source.
//!
//! This module provides `FileSource` for ingesting frames from local files.
//! Two backends:
//! - raw dumps: consecutive RGB8 frames of a fixed `width x height`, no
//!   header (the format `ffmpeg -f rawvideo -pix_fmt rgb24` writes)
//! - `stub://<name>`: a synthetic scene with optional frame limit
//!
//! Decoding compressed video is the job of an upstream adapter.

use anyhow::{anyhow, Result};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, FrameShape};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    /// Local file path, or `stub://<name>` for a synthetic scene.
    pub path: String,
    pub width: u32,
    pub height: u32,
    /// Pacing in frames per second. 0 reads as fast as the consumer allows.
    pub target_fps: u32,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            width: 640,
            height: 480,
            target_fps: 10,
            max_frames: None,
        }
    }
}

/// Local file frame source.
pub struct FileSource {
    config: FileConfig,
    backend: FileBackend,
    frame_count: u64,
    last_emit: Option<Instant>,
}

enum FileBackend {
    Synthetic(SyntheticScene),
    Raw(RawFileReader),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths or stub:// (got '{}')",
                config.path
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "frame size must be non-zero (got {}x{})",
                config.width,
                config.height
            ));
        }
        let backend = if config.path.starts_with("stub://") {
            FileBackend::Synthetic(SyntheticScene::default())
        } else {
            FileBackend::Raw(RawFileReader { reader: None })
        };
        Ok(Self {
            config,
            backend,
            frame_count: 0,
            last_emit: None,
        })
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_secs_f64(1.0 / self.config.target_fps as f64);
        if let Some(last) = self.last_emit {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for FileSource {
    fn open(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(_) => {
                log::info!("FileSource: connected to {} (synthetic)", self.config.path);
            }
            FileBackend::Raw(raw) => {
                let file = File::open(&self.config.path)
                    .map_err(|e| anyhow!("failed to open {}: {}", self.config.path, e))?;
                raw.reader = Some(BufReader::new(file));
                log::info!(
                    "FileSource: opened {} ({}x{} rgb24)",
                    self.config.path,
                    self.config.width,
                    self.config.height
                );
            }
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(max) = self.config.max_frames {
            if self.frame_count >= max {
                return Ok(None);
            }
        }
        let shape = self.frame_shape();
        let index = self.frame_count;
        let pixels = match &mut self.backend {
            FileBackend::Synthetic(scene) => Some(scene.render(shape, index)),
            FileBackend::Raw(raw) => raw.read_frame(shape.byte_len(), &self.config.path)?,
        };
        let Some(pixels) = pixels else {
            return Ok(None);
        };
        self.pace();
        self.frame_count += 1;
        Frame::new(pixels, shape.width, shape.height, index).map(Some)
    }

    fn release(&mut self) {
        if let FileBackend::Raw(raw) = &mut self.backend {
            if raw.reader.take().is_some() {
                log::info!("FileSource: released {}", self.config.path);
            }
        }
    }

    fn frame_shape(&self) -> FrameShape {
        FrameShape::new(self.config.width, self.config.height)
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            FileBackend::Synthetic(_) => true,
            FileBackend::Raw(raw) => raw.reader.is_some(),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Raw rgb24 reader
// ----------------------------------------------------------------------------

struct RawFileReader {
    reader: Option<BufReader<File>>,
}

impl RawFileReader {
    fn read_frame(&mut self, byte_len: usize, path: &str) -> Result<Option<Vec<u8>>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| anyhow!("FileSource {} read before open", path))?;
        let mut buf = vec![0u8; byte_len];
        let mut filled = 0;
        while filled < byte_len {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(anyhow!("failed to read {}: {}", path, e)),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < byte_len {
            log::warn!(
                "FileSource: {} ends with a truncated frame ({} of {} bytes), ignoring",
                path,
                filled,
                byte_len
            );
            return Ok(None);
        }
        Ok(Some(buf))
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demos
// ----------------------------------------------------------------------------

#[derive(Default)]
struct SyntheticScene {
    scene_state: u8,
}

impl SyntheticScene {
    /// Gradient background with a bright square drifting left to right.
    fn render(&mut self, shape: FrameShape, index: u64) -> Vec<u8> {
        if index > 0 && index % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let (w, h) = (shape.width as u64, shape.height as u64);
        let side = (w.min(h) / 8).max(1);
        let sq_x = (index * 4) % w.max(1);
        let sq_y = h / 2;
        let mut pixels = vec![0u8; shape.byte_len()];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let x = i as u64 % w;
            let y = i as u64 / w;
            let inside = x >= sq_x && x < sq_x + side && y >= sq_y && y < sq_y + side;
            let base = ((x + y + self.scene_state as u64) % 256) as u8 / 2;
            let value = if inside { 255 } else { base };
            px.fill(value);
        }
        pixels
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rejects_urls_and_empty_paths() {
        let cfg = |path: &str| FileConfig {
            path: path.to_string(),
            ..FileConfig::default()
        };
        assert!(FileSource::new(cfg("")).is_err());
        assert!(FileSource::new(cfg("rtsp://camera/stream")).is_err());
        assert!(FileSource::new(cfg("stub://street")).is_ok());
        assert!(FileSource::new(cfg("/tmp/video.rgb")).is_ok());
    }

    #[test]
    fn synthetic_source_honours_frame_limit() {
        let mut source = FileSource::new(FileConfig {
            path: "stub://street".to_string(),
            width: 32,
            height: 24,
            target_fps: 0,
            max_frames: Some(3),
        })
        .unwrap();
        source.open().unwrap();
        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            assert_eq!(frame.shape(), FrameShape::new(32, 24));
            indices.push(frame.index);
        }
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(source.stats().frames_captured, 3);
        source.release();
    }

    #[test]
    fn raw_source_reads_whole_frames_and_ignores_tail() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let frame_bytes = 4 * 2 * 3;
        file.write_all(&vec![7u8; frame_bytes * 2 + 5]).unwrap();

        let mut source = FileSource::new(FileConfig {
            path: file.path().display().to_string(),
            width: 4,
            height: 2,
            target_fps: 0,
            max_frames: None,
        })
        .unwrap();
        assert!(source.next_frame().is_err());
        source.open().unwrap();
        assert!(source.is_healthy());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
        source.release();
        assert!(!source.is_healthy());
    }
}
