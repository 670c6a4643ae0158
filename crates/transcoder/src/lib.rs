#![allow(clippy::collapsible_if)]
pub mod capabilities;
pub mod filter;
pub mod launcher;
pub mod monitor;
pub mod process;
pub mod signal;
pub mod tag;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("transcoder binary not found at {0}")]
    BinaryNotFound(PathBuf),
    #[error("failed to spawn transcoder: {0}")]
    SpawnFailed(String),
    #[error("invalid tag parameters: {0}")]
    InvalidTag(String),
    #[error("invalid diagnostic pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Global transcoder configuration.
#[derive(Debug, Clone)]
pub struct TranscoderConfig {
    pub ffmpeg_path: PathBuf,
    /// Impulse response used for the convolution reverb. Reverb is skipped when unset.
    pub impulse_response: Option<PathBuf>,
    pub bitrate: String,
    pub post: PostProcess,
    /// Case-insensitive stderr patterns that abort a session.
    pub fatal_patterns: Vec<String>,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            impulse_response: None,
            bitrate: "256k".into(),
            post: PostProcess::default(),
            fatal_patterns: vec!["error".into(), "invalid".into()],
        }
    }
}

/// Tag settings that are not negotiated with the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagDefaults {
    pub bars_per_cycle: u32,
    pub drop_offset_beats: f64,
    pub watermark_gain: f64,
}

impl Default for TagDefaults {
    fn default() -> Self {
        Self {
            bars_per_cycle: 2,
            drop_offset_beats: 7.0,
            watermark_gain: 0.5,
        }
    }
}

/// Pitch, band-limit and reverb settings applied after the tag is mixed in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostProcess {
    pub sample_rate: u32,
    pub pitch: f64,
    pub tempo: f64,
    pub highpass_hz: u32,
    pub lowpass_hz: u32,
    pub reverb_dry: f64,
    pub reverb_wet: f64,
}

impl Default for PostProcess {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            pitch: 0.83,
            tempo: 0.93,
            highpass_hz: 40,
            lowpass_hz: 3000,
            reverb_dry: 10.0,
            reverb_wet: 10.0,
        }
    }
}
