//! Diagnostics monitor for the transcoder's stderr.

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::TranscodeError;
use crate::signal::{Fault, Signals};

/// Longer lines are classified in pieces of this size.
const MAX_LINE_BYTES: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnostic {
    Fatal,
    Informational,
}

/// Keyword classifier for diagnostic lines.
#[derive(Debug, Clone)]
pub struct DiagnosticClassifier {
    fatal: Option<Regex>,
}

impl DiagnosticClassifier {
    pub fn new<I, S>(patterns: I) -> Result<Self, TranscodeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let escaped: Vec<String> = patterns
            .into_iter()
            .map(|p| regex::escape(p.as_ref()))
            .collect();
        if escaped.is_empty() {
            return Ok(Self { fatal: None });
        }
        let fatal = Regex::new(&format!("(?i){}", escaped.join("|")))?;
        Ok(Self { fatal: Some(fatal) })
    }

    pub fn classify(&self, line: &str) -> Diagnostic {
        if self.fatal.as_ref().is_some_and(|re| re.is_match(line)) {
            Diagnostic::Fatal
        } else {
            Diagnostic::Informational
        }
    }
}

/// Drain `stderr` until it closes or `cancel` fires.
///
/// The first fatal line is reported once and ends the monitor. Everything
/// else is logged and discarded so the subprocess never blocks on a full pipe.
pub async fn run<R>(
    stderr: R,
    signals: Signals,
    classifier: DiagnosticClassifier,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        let mut line_reader = (&mut reader).take(MAX_LINE_BYTES);
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = line_reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => {
                debug!("transcoder diagnostics closed");
                break;
            }
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match classifier.classify(line) {
                    Diagnostic::Fatal => {
                        error!(line, "transcoder reported a fatal error");
                        signals.fail(Fault::Transcoder(line.to_string()));
                        break;
                    }
                    Diagnostic::Informational => warn!(line, "transcoder diagnostic"),
                }
            }
            Err(e) => {
                signals.fail(Fault::Io(format!("read transcoder diagnostics: {e}")));
                break;
            }
        }
    }
}
