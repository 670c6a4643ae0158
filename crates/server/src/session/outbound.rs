use std::pin::Pin;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use futures::{Sink, SinkExt};
use tagg_core::types::ServerMessage;
use tokio::sync::Mutex;
use tracing::debug;

pub type BoxSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Close reasons must fit in a control frame alongside the 2-byte code.
pub const MAX_CLOSE_REASON: usize = 123;

/// The single writer for a session's connection. Each send holds the lock
/// for the whole frame, so frames from different pumps never interleave.
pub struct Outbound {
    sink: Mutex<BoxSink>,
}

impl Outbound {
    pub fn new(sink: BoxSink) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub async fn send(&self, message: Message) -> Result<(), axum::Error> {
        let mut sink = self.sink.lock().await;
        sink.send(message).await
    }

    pub async fn send_audio(&self, chunk: Bytes) -> Result<(), axum::Error> {
        self.send(Message::Binary(chunk)).await
    }

    pub async fn send_progress(&self, progress: f64) -> Result<(), axum::Error> {
        let json = ServerMessage::progress(progress)
            .to_json()
            .map_err(axum::Error::new)?;
        self.send(Message::Text(json.into())).await
    }

    /// Best effort: the peer may already be gone.
    pub async fn close(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: truncate_reason(reason).into(),
        };
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!(error = %e, code, "close notification not delivered");
        }
        let _ = sink.close().await;
    }
}

pub fn truncate_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reasons_pass_through() {
        assert_eq!(truncate_reason("transcoder error"), "transcoder error");
    }

    #[test]
    fn long_reasons_are_cut_on_a_char_boundary() {
        let reason = "é".repeat(100);
        let cut = truncate_reason(&reason);
        assert!(cut.len() <= MAX_CLOSE_REASON);
        assert_eq!(cut.len() % 2, 0);
        assert!(reason.starts_with(&cut));
    }

    #[tokio::test]
    async fn concurrent_sends_arrive_whole() {
        let (tx, mut rx) = futures::channel::mpsc::unbounded::<Message>();
        let sink: BoxSink = Box::pin(tx.sink_map_err(axum::Error::new));
        let outbound = std::sync::Arc::new(Outbound::new(sink));

        let mut tasks = Vec::new();
        for i in 0..20u8 {
            let outbound = outbound.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    outbound.send_audio(Bytes::from(vec![i; 1024])).await
                } else {
                    outbound.send_progress(f64::from(i)).await
                }
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        drop(outbound);

        let mut binary = 0;
        let mut text = 0;
        while let Some(message) = futures::StreamExt::next(&mut rx).await {
            match message {
                Message::Binary(bytes) => {
                    assert_eq!(bytes.len(), 1024);
                    assert!(bytes.iter().all(|b| *b == bytes[0]));
                    binary += 1;
                }
                Message::Text(text_frame) => {
                    assert!(text_frame.as_str().starts_with(r#"{"type":"progress""#));
                    text += 1;
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!((binary, text), (10, 10));
    }
}
