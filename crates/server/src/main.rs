use std::sync::Arc;

use anyhow::Context;
use tagg_server::config::ServerConfig;
use tagg_transcoder::capabilities;
use tagg_transcoder::launcher::FfmpegLauncher;
use tagg_transcoder::monitor::DiagnosticClassifier;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::from_env();
    if config.jwt_secret.is_none() {
        warn!("TAGG_JWT_SECRET not set, accepting anonymous sessions");
    }

    let classifier = DiagnosticClassifier::new(&config.transcoder.fatal_patterns)
        .context("invalid transcoder diagnostic patterns")?;

    let with_reverb = config.transcoder.impulse_response.is_some();
    let capabilities = capabilities::detect(&config.transcoder.ffmpeg_path, with_reverb).await;
    if !capabilities.is_usable() {
        warn!(?capabilities, "ffmpeg cannot run the tag filter graph, sessions will fail");
    }

    let watermarks = tagg_server::watermark::DirectoryWatermarks::new(
        &config.watermark_dir,
        &config.default_watermark,
    );
    info!(dir = ?config.watermark_dir, default = ?config.default_watermark, "watermark store");

    let shutdown = CancellationToken::new();

    let app_state = tagg_server::state::AppState {
        jwt_secret: config.jwt_secret.clone(),
        launcher: Arc::new(FfmpegLauncher::new(config.transcoder.clone())),
        classifier,
        watermarks: Arc::new(watermarks),
        session: config.session.clone(),
        capabilities,
        shutdown: shutdown.clone(),
    };

    let app = tagg_server::routes::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .context("failed to bind")?;
    info!(addr = %config.bind, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("server error")?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels every live session.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested, ending live sessions");
    shutdown.cancel();
}
