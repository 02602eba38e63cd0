//! Per-frame output and where it goes.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

use crate::analytics::{CrowdReport, FlowReport, ParkingReport, Track, TrackId, TrafficReport};

/// Everything the analytics stage derived from one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub traffic: TrafficReport,
    pub crowd: CrowdReport,
    pub parking: ParkingReport,
    pub tracks: BTreeMap<TrackId, Track>,
    pub flow: FlowReport,
}

/// Consumer of frame reports.
pub trait ReportSink {
    fn emit(&mut self, report: &FrameReport) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One JSON document per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn emit(&mut self, report: &FrameReport) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)
            .map_err(|e| anyhow!("failed to encode frame {}: {}", report.frame_index, e))?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub reports: Vec<FrameReport>,
}

impl ReportSink for MemorySink {
    fn emit(&mut self, report: &FrameReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
