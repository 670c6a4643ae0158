//! Client → transcoder direction of a session.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, close_code};
use futures::StreamExt;
use futures::stream::BoxStream;
use tagg_transcoder::process::TranscoderProcess;
use tagg_transcoder::signal::{Completion, Fault, Signals};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::outbound::Outbound;
use super::progress::ProgressTracker;

/// Status a peer may close with without failing the session.
const CLEAN_CLOSE_CODES: [u16; 3] = [close_code::NORMAL, close_code::AWAY, close_code::STATUS];

pub type InboundStream = BoxStream<'static, Result<Message, axum::Error>>;

/// What the ingress pump did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressReport {
    pub received_bytes: u64,
    pub frames: u64,
    pub discarded_bytes: u64,
}

pub struct IngressPump {
    pub inbound: InboundStream,
    pub process: Arc<TranscoderProcess>,
    pub outbound: Arc<Outbound>,
    pub signals: Signals,
    pub cancel: CancellationToken,
    pub file_name: String,
    pub file_size: i64,
    pub sample_interval: Duration,
}

enum Step {
    Continue,
    Stop,
}

impl IngressPump {
    pub async fn run(mut self) -> IngressReport {
        let mut progress = ProgressTracker::new(self.file_size);
        let mut report = IngressReport::default();
        let mut input_finished = false;

        let mut sampler = tokio::time::interval_at(
            Instant::now() + self.sample_interval,
            self.sample_interval,
        );
        sampler.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sampler.tick() => {
                    info!(
                        name = %self.file_name,
                        bytes = progress.received(),
                        file_size = self.file_size,
                        progress = progress.last_percent().round(),
                        "processing"
                    );
                    continue;
                }
                frame = self.inbound.next() => frame,
            };

            let step = match frame {
                None => {
                    self.signals
                        .fail(Fault::Io("connection ended without a close frame".into()));
                    Step::Stop
                }
                Some(Err(e)) => {
                    self.signals.fail(Fault::Io(format!("websocket read error: {e}")));
                    Step::Stop
                }
                Some(Ok(Message::Close(frame))) => self.peer_closed(frame),
                Some(Ok(Message::Text(_))) => {
                    self.signals.fail(Fault::Protocol(
                        "unexpected text frame after handshake".into(),
                    ));
                    Step::Stop
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => Step::Continue,
                Some(Ok(Message::Binary(data))) => {
                    report.frames += 1;
                    if input_finished {
                        report.discarded_bytes += data.len() as u64;
                        warn!(
                            len = data.len(),
                            file_size = self.file_size,
                            "audio beyond declared size discarded"
                        );
                        continue;
                    }

                    let written = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        result = self.process.input().write(&data) => result,
                    };
                    // The process reports its own write failures.
                    if written.is_err() {
                        break;
                    }
                    report.received_bytes += data.len() as u64;

                    match self.forward_progress(&mut progress, data.len()).await {
                        Step::Stop => break,
                        Step::Continue => {}
                    }

                    if progress.is_complete() {
                        if progress.is_overrun() {
                            warn!(
                                received = progress.received(),
                                file_size = self.file_size,
                                "client sent more than it declared"
                            );
                        }
                        debug!(bytes = progress.received(), "declared size reached, closing transcoder input");
                        self.process.input().finish().await;
                        input_finished = true;
                    }
                    Step::Continue
                }
            };

            if let Step::Stop = step {
                break;
            }
        }

        debug!(
            received = report.received_bytes,
            frames = report.frames,
            "ingress stopped"
        );
        report
    }

    fn peer_closed(&self, frame: Option<CloseFrame>) -> Step {
        match frame {
            Some(frame) if !CLEAN_CLOSE_CODES.contains(&frame.code) => {
                self.signals.fail(Fault::Io(format!(
                    "client closed with code {}: {}",
                    frame.code,
                    frame.reason.as_str()
                )));
            }
            frame => {
                info!(code = frame.map(|f| f.code), "client closed the connection");
                self.signals.complete(Completion::PeerClosed);
            }
        }
        Step::Stop
    }

    async fn forward_progress(&mut self, progress: &mut ProgressTracker, len: usize) -> Step {
        let Some(percent) = progress.record(len) else {
            return Step::Continue;
        };

        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Step::Stop,
            result = self.outbound.send_progress(percent) => result,
        };
        match sent {
            Ok(()) => Step::Continue,
            Err(e) => {
                self.signals.fail(Fault::Io(format!("failed to send progress: {e}")));
                Step::Stop
            }
        }
    }
}
