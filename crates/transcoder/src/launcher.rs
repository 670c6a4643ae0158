use std::path::Path;

use crate::TranscoderConfig;
use crate::filter;
use crate::process::TranscodeCommand;
use crate::tag::TagParameters;

/// Decides which subprocess a session runs.
pub trait Launcher: Send + Sync {
    fn command(&self, tag: &TagParameters, watermark: &Path) -> TranscodeCommand;
}

/// Runs the configured ffmpeg with the tag filter graph.
#[derive(Debug, Clone)]
pub struct FfmpegLauncher {
    config: TranscoderConfig,
}

impl FfmpegLauncher {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }
}

impl Launcher for FfmpegLauncher {
    fn command(&self, tag: &TagParameters, watermark: &Path) -> TranscodeCommand {
        filter::ffmpeg_command(&self.config, tag, watermark)
    }
}
