// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

/// Tunables for the capture, analysis and playback pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Encoder chunk cadence; a forced stop loses at most one chunk.
    pub chunk_interval_ms: u64,
    /// Recording clock granularity. Whole seconds on purpose.
    pub elapsed_tick_ms: u64,
    pub metadata_probe_timeout_ms: u64,
    pub nominal_bitrate_bps: u32,
    pub max_estimated_duration_secs: f64,
    pub max_tracks_per_project: usize,
    pub analyser_fft_size: usize,
    pub level_reference_ceiling: f32,
    pub live_waveform_capacity: usize,
    pub waveform_peak_count: usize,
    pub transform_min_clip_secs: f64,
    pub transform_max_clip_secs: f64,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 100,
            elapsed_tick_ms: 1000,
            metadata_probe_timeout_ms: 5000,
            nominal_bitrate_bps: 128_000,
            max_estimated_duration_secs: 3600.0,
            max_tracks_per_project: 10,
            analyser_fft_size: 256,
            level_reference_ceiling: 128.0,
            live_waveform_capacity: 200,
            waveform_peak_count: 200,
            transform_min_clip_secs: 0.5,
            transform_max_clip_secs: 10.0,
        }
    }
}

impl StudioConfig {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn elapsed_tick(&self) -> Duration {
        Duration::from_millis(self.elapsed_tick_ms)
    }

    pub fn metadata_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_probe_timeout_ms)
    }

    pub fn save_to_disk(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("creating config file {}", path.display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_from_disk(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening config file {}", path.display()))?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}
