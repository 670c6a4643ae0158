use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tagg_transcoder::{TagDefaults, TranscoderConfig};

/// Per-session pipeline settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Ceiling on the whole session, handshake included.
    pub deadline: Duration,
    /// Largest transcoder read forwarded as one binary frame.
    pub chunk_size: usize,
    /// How often the ingress pump logs an operator sample.
    pub sample_interval: Duration,
    pub tag_defaults: TagDefaults,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(600),
            chunk_size: 32 * 1024,
            sample_interval: Duration::from_secs(2),
            tag_defaults: TagDefaults::default(),
        }
    }
}

/// Everything `main` needs to build the application.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub jwt_secret: Option<String>,
    pub watermark_dir: PathBuf,
    pub default_watermark: PathBuf,
    pub transcoder: TranscoderConfig,
    pub session: SessionConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let transcoder_defaults = TranscoderConfig::default();
        let session_defaults = SessionConfig::default();
        let tag_defaults = session_defaults.tag_defaults;

        let transcoder = TranscoderConfig {
            ffmpeg_path: lookup("TAGG_FFMPEG")
                .map(PathBuf::from)
                .unwrap_or(transcoder_defaults.ffmpeg_path),
            impulse_response: lookup("TAGG_IR_PATH")
                .or_else(|| lookup("IR_PATH"))
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            bitrate: lookup("TAGG_BITRATE").unwrap_or(transcoder_defaults.bitrate),
            post: transcoder_defaults.post,
            fatal_patterns: lookup("TAGG_FATAL_PATTERNS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(transcoder_defaults.fatal_patterns),
        };

        let session = SessionConfig {
            deadline: parsed(&lookup, "TAGG_SESSION_DEADLINE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(session_defaults.deadline),
            chunk_size: parsed(&lookup, "TAGG_CHUNK_SIZE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(session_defaults.chunk_size),
            sample_interval: session_defaults.sample_interval,
            tag_defaults: TagDefaults {
                bars_per_cycle: parsed(&lookup, "TAGG_BARS_PER_CYCLE").unwrap_or(tag_defaults.bars_per_cycle),
                drop_offset_beats: parsed(&lookup, "TAGG_DROP_OFFSET_BEATS")
                    .unwrap_or(tag_defaults.drop_offset_beats),
                watermark_gain: parsed(&lookup, "TAGG_WATERMARK_GAIN").unwrap_or(tag_defaults.watermark_gain),
            },
        };

        Self {
            bind: lookup("TAGG_BIND").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret: lookup("TAGG_JWT_SECRET").filter(|s| !s.is_empty()),
            watermark_dir: lookup("TAGG_WATERMARK_DIR")
                .unwrap_or_else(|| "audio/tags".to_string())
                .into(),
            default_watermark: lookup("TAGG_DEFAULT_WATERMARK")
                .unwrap_or_else(|| "audio/tag.wav".to_string())
                .into(),
            transcoder,
            session,
        }
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}
