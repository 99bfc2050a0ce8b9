use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

const SHM_FILE: &str = "/dev/shm/aether_audio_event";
const SHM_FILE_NO_TMPFS: &str = "/tmp/aether_audio_event.shm";
const FALLBACK_FILE: &str = "/tmp/aether_last_event.json";

/// Top-level configuration structure shared by the daemon and its consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AetherConfig {
    pub analysis: AnalysisConfig,
    pub channel: ChannelConfig,
    pub smoothing: SmoothingConfig,
}

impl AetherConfig {
    /// Loads a JSON configuration file. Sections or fields missing from the
    /// file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Settings for the producer-side band analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sample_rate: u32,
    /// Samples per analysed frame. 2048 at 48 kHz is roughly 43 ms.
    pub chunk_size: usize,
    /// log10 magnitude that maps to 0.0 for an individual band.
    pub band_log_floor: f32,
    /// Width of the log10 window for individual bands.
    pub band_log_range: f32,
    /// log10 magnitude that maps to 0.0 for the total energy.
    pub total_log_floor: f32,
    pub total_log_range: f32,
    /// Frames whose total energy does not exceed this are never published.
    pub gate_threshold: f32,
    /// A frame is suppressed when total is below `suppress_total` and the
    /// dominant band is below `suppress_band`.
    pub suppress_total: f32,
    pub suppress_band: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            chunk_size: 2048,
            band_log_floor: 5.5,
            band_log_range: 2.0,
            total_log_floor: 6.0,
            total_log_range: 2.0,
            gate_threshold: 0.05,
            suppress_total: 0.10,
            suppress_band: 0.15,
        }
    }
}

/// Locations of the shared region and its file fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub shm_path: PathBuf,
    pub fallback_path: PathBuf,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            shm_path: default_shm_path(),
            fallback_path: PathBuf::from(FALLBACK_FILE),
        }
    }
}

/// RAM-backed path when `/dev/shm` exists, `/tmp` otherwise (macOS, some
/// containers).
pub fn default_shm_path() -> PathBuf {
    if Path::new("/dev/shm").is_dir() {
        PathBuf::from(SHM_FILE)
    } else {
        PathBuf::from(SHM_FILE_NO_TMPFS)
    }
}

/// Consumer-side smoothing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Fraction of the gap to the target closed per tick.
    pub smooth_factor: f32,
    /// Multiplier applied to targets on decaying frames.
    pub decay_factor: f32,
    /// Render loop rate.
    pub fps: u32,
    /// Idle frames a lighting consumer waits before it starts decaying.
    pub silence_hold_frames: u32,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            smooth_factor: 0.3,
            decay_factor: 0.85,
            fps: 30,
            silence_hold_frames: 5,
        }
    }
}
