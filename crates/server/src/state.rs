use std::sync::Arc;

use tagg_transcoder::capabilities::FfmpegCapabilities;
use tagg_transcoder::launcher::Launcher;
use tagg_transcoder::monitor::DiagnosticClassifier;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::watermark::WatermarkStore;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Unset means every caller is anonymous.
    pub jwt_secret: Option<String>,
    pub launcher: Arc<dyn Launcher>,
    pub classifier: DiagnosticClassifier,
    pub watermarks: Arc<dyn WatermarkStore>,
    pub session: SessionConfig,
    pub capabilities: FfmpegCapabilities,
    /// Cancelled on server shutdown; every session scope is a child of it.
    pub shutdown: CancellationToken,
}
