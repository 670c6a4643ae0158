//! Startup check that the configured ffmpeg can run the tag filter graph.
//!
//! Runs `ffmpeg -filters` and `ffmpeg -encoders` once and looks for what the
//! graph in [`crate::filter`] needs.

use std::path::Path;

use tracing::{info, warn};

/// Filters referenced by the tag graph.
pub const REQUIRED_FILTERS: &[&str] = &[
    "aresample", "apad", "atrim", "aloop", "volume", "adelay", "amix", "highpass", "lowpass",
    "asetrate", "atempo",
];

/// Needed only when an impulse response is configured.
pub const REVERB_FILTER: &str = "afir";

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FfmpegCapabilities {
    pub available: bool,
    pub aac_encoder: bool,
    pub missing_filters: Vec<String>,
}

impl FfmpegCapabilities {
    pub fn is_usable(&self) -> bool {
        self.available && self.aac_encoder && self.missing_filters.is_empty()
    }
}

/// Query ffmpeg for its filters and encoders.
pub async fn detect(ffmpeg_path: &Path, with_reverb: bool) -> FfmpegCapabilities {
    let filters = match query(ffmpeg_path, "-filters").await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, ?ffmpeg_path, "could not query ffmpeg filters");
            return FfmpegCapabilities::default();
        }
    };
    let encoders = query(ffmpeg_path, "-encoders").await.unwrap_or_default();

    let caps = FfmpegCapabilities {
        available: true,
        aac_encoder: lists_name(&encoders, "aac"),
        missing_filters: missing_filters(&filters, with_reverb),
    };

    info!(?caps, "ffmpeg capability check complete");
    caps
}

fn missing_filters(listing: &str, with_reverb: bool) -> Vec<String> {
    REQUIRED_FILTERS
        .iter()
        .copied()
        .chain(with_reverb.then_some(REVERB_FILTER))
        .filter(|name| !lists_name(listing, name))
        .map(str::to_string)
        .collect()
}

/// ffmpeg listings put the name in the second whitespace-separated column.
fn lists_name(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(name))
}

async fn query(ffmpeg_path: &Path, flag: &str) -> Result<String, String> {
    let output = tokio::process::Command::new(ffmpeg_path)
        .args(["-hide_banner", flag])
        .output()
        .await
        .map_err(|e| format!("spawn ffmpeg: {e}"))?;

    if !output.status.success() {
        return Err(format!("ffmpeg {flag} failed"));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
