//! Transcoder → client direction of a session.

use std::sync::Arc;

use axum::body::Bytes;
use tagg_transcoder::process::TranscoderProcess;
use tagg_transcoder::signal::{Fault, Signals};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::outbound::Outbound;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgressReport {
    pub sent_bytes: u64,
    pub chunks: u64,
}

pub struct EgressPump {
    pub process: Arc<TranscoderProcess>,
    pub outbound: Arc<Outbound>,
    pub signals: Signals,
    pub cancel: CancellationToken,
    pub chunk_size: usize,
}

impl EgressPump {
    pub async fn run(self) -> EgressReport {
        let mut report = EgressReport::default();
        let mut buf = vec![0u8; self.chunk_size.max(1)];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.process.output().read(&mut buf) => result,
            };

            // End of output and read errors are signalled by the process.
            let n = match read {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };

            let chunk = Bytes::copy_from_slice(&buf[..n]);
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.outbound.send_audio(chunk) => result,
            };
            if let Err(e) = sent {
                self.signals
                    .fail(Fault::Io(format!("failed to send audio: {e}")));
                break;
            }

            report.sent_bytes += n as u64;
            report.chunks += 1;
        }

        debug!(sent = report.sent_bytes, chunks = report.chunks, "egress stopped");
        report
    }
}
