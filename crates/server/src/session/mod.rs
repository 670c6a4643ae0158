//! One transcode session per accepted WebSocket.
//!
//! The coordinator reads the metadata handshake, spawns the transcoder and
//! runs the two pumps. It then waits for the first fault, completion,
//! deadline or shutdown. Whatever decides the session, both pumps are
//! cancelled and joined before the transcoder is released, and only then
//! is the closing frame sent.

pub mod egress;
pub mod ingress;
pub mod outbound;
pub mod progress;

use std::sync::Arc;

use axum::extract::ws::{Message, close_code};
use futures::{Sink, Stream, StreamExt};
use tagg_core::types::Metadata;
use tagg_transcoder::process::TranscoderProcess;
use tagg_transcoder::signal::{self, Completion, Fault};
use tagg_transcoder::tag::TagParameters;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::state::AppState;
use egress::{EgressPump, EgressReport};
use ingress::{InboundStream, IngressPump, IngressReport};
use outbound::Outbound;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session setup failed: {0}")]
    Setup(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("transcoder error: {0}")]
    TranscoderFatal(String),
    #[error("stream error: {0}")]
    Io(String),
}

impl SessionError {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Protocol(_) => close_code::PROTOCOL,
            Self::Setup(_) | Self::TranscoderFatal(_) | Self::Io(_) => close_code::ERROR,
        }
    }

    /// Reason sent to the client. Setup details stay in the server log.
    pub fn close_reason(&self) -> String {
        match self {
            Self::Setup(_) => "failed to start transcoding".into(),
            Self::Protocol(msg) => format!("protocol violation: {msg}"),
            Self::TranscoderFatal(_) | Self::Io(_) => "stream processing error".into(),
        }
    }
}

impl From<Fault> for SessionError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Transcoder(line) => Self::TranscoderFatal(line),
            Fault::Protocol(msg) => Self::Protocol(msg),
            Fault::Io(msg) => Self::Io(msg),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(Completion),
    Failed(SessionError),
    DeadlineExceeded,
    ShutDown,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Run a session to its end over an upgraded socket.
///
/// Any duplex message stream works here; the route hands in an axum
/// `WebSocket`, tests hand in an in-memory pair.
pub async fn run_session<S>(socket: S, identity: Identity, state: AppState) -> SessionOutcome
where
    S: Stream<Item = Result<Message, axum::Error>>
        + Sink<Message, Error = axum::Error>
        + Send
        + 'static,
{
    let session_id = Uuid::new_v4();
    let span = info_span!("session", %session_id, user = %identity.user_id);
    coordinate(socket, identity, state).instrument(span).await
}

async fn coordinate<S>(socket: S, identity: Identity, state: AppState) -> SessionOutcome
where
    S: Stream<Item = Result<Message, axum::Error>>
        + Sink<Message, Error = axum::Error>
        + Send
        + 'static,
{
    let started = Instant::now();
    let deadline = started + state.session.deadline;
    let scope = state.shutdown.child_token();

    let (sink, stream) = socket.split::<Message>();
    let outbound = Arc::new(Outbound::new(Box::pin(sink)));
    let mut inbound: InboundStream = stream.boxed();

    info!("websocket connection accepted");

    let metadata = match read_metadata(&mut inbound, deadline, &scope).await {
        Ok(metadata) => metadata,
        Err(outcome) => return settle(&outbound, outcome, started, None).await,
    };
    info!(
        file_name = %metadata.file_name,
        file_size = metadata.file_size,
        mime_type = %metadata.mime_type,
        bpm = ?metadata.bpm,
        "metadata received"
    );

    let tag = match TagParameters::from_bpm(metadata.bpm, &state.session.tag_defaults) {
        Ok(tag) => tag,
        Err(e) => {
            let outcome = SessionOutcome::Failed(SessionError::Protocol(e.to_string()));
            return settle(&outbound, outcome, started, None).await;
        }
    };

    let watermark = match state.watermarks.watermark_for(&identity) {
        Ok(path) => path,
        Err(e) => {
            let outcome = SessionOutcome::Failed(SessionError::Setup(e.to_string()));
            return settle(&outbound, outcome, started, None).await;
        }
    };

    let (signals, mut receivers) = signal::channel();
    let command = state.launcher.command(&tag, &watermark);
    let process = match TranscoderProcess::spawn(
        command,
        signals.clone(),
        state.classifier.clone(),
        scope.clone(),
    ) {
        Ok(process) => Arc::new(process),
        Err(e) => {
            error!(error = %e, "failed to start transcoder");
            let outcome = SessionOutcome::Failed(SessionError::Setup(e.to_string()));
            return settle(&outbound, outcome, started, None).await;
        }
    };

    let ingress = tokio::spawn(
        IngressPump {
            inbound,
            process: process.clone(),
            outbound: outbound.clone(),
            signals: signals.clone(),
            cancel: scope.clone(),
            file_name: metadata.file_name.clone(),
            file_size: metadata.file_size,
            sample_interval: state.session.sample_interval,
        }
        .run()
        .in_current_span(),
    );
    let egress = tokio::spawn(
        EgressPump {
            process: process.clone(),
            outbound: outbound.clone(),
            signals: signals.clone(),
            cancel: scope.clone(),
            chunk_size: state.session.chunk_size,
        }
        .run()
        .in_current_span(),
    );

    info!("waiting for completion or errors");
    let outcome = tokio::select! {
        biased;
        Some(fault) = receivers.faults.recv() => SessionOutcome::Failed(fault.into()),
        Some(done) = receivers.completions.recv() => SessionOutcome::Completed(done),
        _ = tokio::time::sleep_until(deadline) => SessionOutcome::DeadlineExceeded,
        _ = scope.cancelled() => SessionOutcome::ShutDown,
    };
    drop(signals);

    scope.cancel();
    let ingress = ingress.await.unwrap_or_else(|e| {
        warn!(error = %e, "ingress task did not finish cleanly");
        IngressReport::default()
    });
    let egress = egress.await.unwrap_or_else(|e| {
        warn!(error = %e, "egress task did not finish cleanly");
        EgressReport::default()
    });
    process.close().await;

    settle(&outbound, outcome, started, Some((ingress, egress))).await
}

/// Read the handshake, skipping keep-alives.
async fn read_metadata(
    inbound: &mut InboundStream,
    deadline: Instant,
    scope: &CancellationToken,
) -> Result<Metadata, SessionOutcome> {
    loop {
        let frame = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(SessionOutcome::ShutDown),
            _ = tokio::time::sleep_until(deadline) => return Err(SessionOutcome::DeadlineExceeded),
            frame = inbound.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                return Metadata::parse(text.as_str()).map_err(|e| {
                    SessionOutcome::Failed(SessionError::Protocol(format!("invalid metadata: {e}")))
                });
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Binary(_))) => {
                return Err(SessionOutcome::Failed(SessionError::Protocol(
                    "first message must be text metadata".into(),
                )));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(SessionOutcome::Failed(SessionError::Io(
                    "connection closed before metadata".into(),
                )));
            }
            Some(Err(e)) => {
                return Err(SessionOutcome::Failed(SessionError::Io(format!(
                    "failed to read metadata: {e}"
                ))));
            }
        }
    }
}

/// Send the closing frame for `outcome` and log the session summary.
async fn settle(
    outbound: &Outbound,
    outcome: SessionOutcome,
    started: Instant,
    reports: Option<(IngressReport, EgressReport)>,
) -> SessionOutcome {
    match &outcome {
        SessionOutcome::Completed(_) => {
            outbound.close(close_code::NORMAL, "transcoding complete").await;
        }
        SessionOutcome::Failed(e) => {
            outbound.close(e.close_code(), &e.close_reason()).await;
        }
        // Nobody is owed a notification: the client ran out of time or the
        // server is going away.
        SessionOutcome::DeadlineExceeded | SessionOutcome::ShutDown => {}
    }

    let (ingress, egress) = reports.unwrap_or_default();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        SessionOutcome::Failed(e) => error!(
            error = %e,
            received = ingress.received_bytes,
            sent = egress.sent_bytes,
            elapsed_ms,
            "session failed"
        ),
        other => info!(
            outcome = ?other,
            received = ingress.received_bytes,
            sent = egress.sent_bytes,
            discarded = ingress.discarded_bytes,
            elapsed_ms,
            "session ended"
        ),
    }
    outcome
}
