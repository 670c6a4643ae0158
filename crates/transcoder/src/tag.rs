//! Watermark timing derived from the track tempo.

use crate::{TagDefaults, TranscodeError};

const BEATS_PER_BAR: f64 = 4.0;

/// Validated tag parameters with their timing computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagParameters {
    bpm: f64,
    bars_per_cycle: u32,
    drop_offset_beats: f64,
    watermark_gain: f64,
    timing: TagTiming,
}

/// Durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagTiming {
    pub beat_secs: f64,
    pub bar_secs: f64,
    pub drop_offset_secs: f64,
    pub cycle_secs: f64,
}

impl TagParameters {
    pub fn new(
        bpm: f64,
        bars_per_cycle: u32,
        drop_offset_beats: f64,
        watermark_gain: f64,
    ) -> Result<Self, TranscodeError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TranscodeError::InvalidTag(format!(
                "bpm must be a positive number, got {bpm}"
            )));
        }
        if bars_per_cycle == 0 {
            return Err(TranscodeError::InvalidTag(
                "bars per cycle must be at least 1".into(),
            ));
        }
        if !drop_offset_beats.is_finite() || drop_offset_beats < 0.0 {
            return Err(TranscodeError::InvalidTag(format!(
                "drop offset must be a non-negative number of beats, got {drop_offset_beats}"
            )));
        }
        if !watermark_gain.is_finite() || watermark_gain < 0.0 {
            return Err(TranscodeError::InvalidTag(format!(
                "watermark gain must be non-negative, got {watermark_gain}"
            )));
        }

        let beat_secs = 60.0 / bpm;
        let bar_secs = BEATS_PER_BAR * beat_secs;
        let timing = TagTiming {
            beat_secs,
            bar_secs,
            drop_offset_secs: drop_offset_beats * beat_secs,
            cycle_secs: f64::from(bars_per_cycle) * bar_secs,
        };

        Ok(Self {
            bpm,
            bars_per_cycle,
            drop_offset_beats,
            watermark_gain,
            timing,
        })
    }

    /// Combine a client-supplied BPM with the server's defaults.
    pub fn from_bpm(bpm: Option<f64>, defaults: &TagDefaults) -> Result<Self, TranscodeError> {
        let bpm = bpm.ok_or_else(|| TranscodeError::InvalidTag("bpm is required".into()))?;
        Self::new(
            bpm,
            defaults.bars_per_cycle,
            defaults.drop_offset_beats,
            defaults.watermark_gain,
        )
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn bars_per_cycle(&self) -> u32 {
        self.bars_per_cycle
    }

    pub fn drop_offset_beats(&self) -> f64 {
        self.drop_offset_beats
    }

    pub fn watermark_gain(&self) -> f64 {
        self.watermark_gain
    }

    pub fn timing(&self) -> &TagTiming {
        &self.timing
    }
}
