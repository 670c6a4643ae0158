use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::TranscodeError;
use crate::monitor::{self, DiagnosticClassifier};
use crate::signal::{Completion, Fault, Signals};

/// Program and arguments for one transcoder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl TranscodeCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Write side of the transcoder: its stdin.
pub struct ProcessInput {
    pipe: Mutex<Option<ChildStdin>>,
    failed: AtomicBool,
    signals: Signals,
}

impl ProcessInput {
    /// Write the whole buffer. A failure is reported on the session's fault
    /// channel the first time only.
    pub async fn write(&self, bytes: &[u8]) -> io::Result<usize> {
        let mut pipe = self.pipe.lock().await;
        let Some(stdin) = pipe.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transcoder input already closed",
            ));
        };

        match stdin.write_all(bytes).await {
            Ok(()) => Ok(bytes.len()),
            Err(e) => {
                if !self.failed.swap(true, Ordering::AcqRel) {
                    self.signals
                        .fail(Fault::Io(format!("write to transcoder input: {e}")));
                }
                Err(e)
            }
        }
    }

    /// Close stdin so the transcoder sees end of input. Idempotent.
    pub async fn finish(&self) {
        if let Some(mut stdin) = self.pipe.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
    }
}

/// Read side of the transcoder: its stdout.
pub struct ProcessOutput {
    pipe: Mutex<Option<ChildStdout>>,
    finished: AtomicBool,
    signals: Signals,
}

impl ProcessOutput {
    /// Read the next chunk. End of stream returns `Ok(0)` and raises
    /// completion; any other error raises a fault.
    pub async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pipe = self.pipe.lock().await;
        let Some(stdout) = pipe.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transcoder output already closed",
            ));
        };

        let result = stdout.read(buf).await;
        match &result {
            Ok(0) => {
                if !self.finished.swap(true, Ordering::AcqRel) {
                    self.signals.complete(Completion::OutputEnded);
                }
            }
            Ok(_) => {}
            Err(e) => {
                if !self.finished.swap(true, Ordering::AcqRel) {
                    self.signals
                        .fail(Fault::Io(format!("read transcoder output: {e}")));
                }
            }
        }
        result
    }

    async fn close(&self) {
        self.pipe.lock().await.take();
    }
}

/// One running transcoder subprocess with its three pipes.
pub struct TranscoderProcess {
    pid: Option<u32>,
    input: ProcessInput,
    output: ProcessOutput,
    monitor: StdMutex<Option<JoinHandle<()>>>,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl TranscoderProcess {
    /// Spawn the subprocess and attach the diagnostics monitor to its stderr.
    ///
    /// On failure nothing is left running: no monitor is started and any pipe
    /// ends already created are dropped with the child.
    pub fn spawn(
        command: TranscodeCommand,
        signals: Signals,
        classifier: DiagnosticClassifier,
        cancel: CancellationToken,
    ) -> Result<Self, TranscodeError> {
        let mut child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => TranscodeError::BinaryNotFound(command.program.clone()),
                _ => TranscodeError::SpawnFailed(e.to_string()),
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.start_kill();
            return Err(TranscodeError::SpawnFailed(
                "transcoder pipes unavailable".into(),
            ));
        };

        let pid = child.id();
        let monitor = tokio::spawn(monitor::run(stderr, signals.clone(), classifier, cancel));

        info!(pid, program = ?command.program, args = ?command.args, "spawned transcoder");

        Ok(Self {
            pid,
            input: ProcessInput {
                pipe: Mutex::new(Some(stdin)),
                failed: AtomicBool::new(false),
                signals: signals.clone(),
            },
            output: ProcessOutput {
                pipe: Mutex::new(Some(stdout)),
                finished: AtomicBool::new(false),
                signals,
            },
            monitor: StdMutex::new(Some(monitor)),
            child: Mutex::new(Some(child)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn input(&self) -> &ProcessInput {
        &self.input
    }

    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close all pipes, stop the monitor and reap the child.
    ///
    /// Only the first call does anything; later calls return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.input.finish().await;
        self.output.close().await;

        let monitor = self.monitor.lock().ok().and_then(|mut m| m.take());
        if let Some(monitor) = monitor {
            monitor.abort();
            let _ = monitor.await;
        }

        if let Some(mut child) = self.child.lock().await.take() {
            match child.try_wait() {
                Ok(Some(status)) => info!(pid = self.pid, %status, "transcoder exited"),
                Ok(None) => {
                    let _ = child.start_kill();
                    match child.wait().await {
                        Ok(status) => debug!(pid = self.pid, %status, "transcoder killed"),
                        Err(e) => warn!(pid = self.pid, error = %e, "failed to reap transcoder"),
                    }
                }
                Err(e) => warn!(pid = self.pid, error = %e, "failed to query transcoder status"),
            }
        }

        info!(pid = self.pid, "transcoder released");
    }
}

impl Drop for TranscoderProcess {
    fn drop(&mut self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(monitor) = monitor.take() {
                monitor.abort();
            }
        }
        if let Some(child) = self.child.get_mut().as_mut() {
            // Best-effort kill on drop
            let _ = child.start_kill();
        }
    }
}
