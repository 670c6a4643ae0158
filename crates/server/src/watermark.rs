//! Lookup of the watermark asset embedded for a caller.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::auth::Identity;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("no watermark asset available for {0}")]
    Missing(String),
    #[error("watermark path error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves which audio file gets mixed into a caller's output.
pub trait WatermarkStore: Send + Sync {
    fn watermark_for(&self, identity: &Identity) -> Result<PathBuf, WatermarkError>;
}

/// `<dir>/<user_id>.wav`, falling back to a shared default asset.
#[derive(Debug, Clone)]
pub struct DirectoryWatermarks {
    dir: PathBuf,
    default: PathBuf,
}

impl DirectoryWatermarks {
    pub fn new(dir: impl Into<PathBuf>, default: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            default: default.into(),
        }
    }
}

impl WatermarkStore for DirectoryWatermarks {
    fn watermark_for(&self, identity: &Identity) -> Result<PathBuf, WatermarkError> {
        if is_safe_file_stem(&identity.user_id) {
            let personal = self.dir.join(format!("{}.wav", identity.user_id));
            if personal.is_file() {
                debug!(path = ?personal, "using personal watermark");
                return Ok(personal.canonicalize()?);
            }
        }

        if self.default.is_file() {
            return Ok(self.default.canonicalize()?);
        }

        Err(WatermarkError::Missing(identity.user_id.clone()))
    }
}

/// User IDs become file names; refuse anything that could leave `dir`.
fn is_safe_file_stem(stem: &str) -> bool {
    !stem.is_empty()
        && !stem.starts_with('.')
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && Path::new(stem).components().count() == 1
}
