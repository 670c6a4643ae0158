//! Failure and completion signals shared by the activities of one session.
//!
//! Raisers never block: both channels are sized for every activity that may
//! report on them, and a report that finds the channel full or closed is
//! dropped because the session is already settling.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Monitor, ingress pump and egress pump may each report one failure.
pub const FAILURE_SLOTS: usize = 3;

/// Ingress (peer closed) and egress (output ended) may each report completion.
pub const COMPLETION_SLOTS: usize = 2;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Fault {
    #[error("transcoder error: {0}")]
    Transcoder(String),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The client closed the connection normally.
    PeerClosed,
    /// The transcoder reached end of output.
    OutputEnded,
}

#[derive(Debug, Clone)]
pub struct Signals {
    faults: mpsc::Sender<Fault>,
    completions: mpsc::Sender<Completion>,
}

pub struct SignalReceivers {
    pub faults: mpsc::Receiver<Fault>,
    pub completions: mpsc::Receiver<Completion>,
}

pub fn channel() -> (Signals, SignalReceivers) {
    let (faults_tx, faults_rx) = mpsc::channel(FAILURE_SLOTS);
    let (done_tx, done_rx) = mpsc::channel(COMPLETION_SLOTS);
    (
        Signals {
            faults: faults_tx,
            completions: done_tx,
        },
        SignalReceivers {
            faults: faults_rx,
            completions: done_rx,
        },
    )
}

impl Signals {
    pub fn fail(&self, fault: Fault) {
        match self.faults.try_send(fault) {
            Ok(()) => {}
            Err(TrySendError::Full(fault) | TrySendError::Closed(fault)) => {
                debug!(%fault, "session already settling, fault dropped");
            }
        }
    }

    pub fn complete(&self, completion: Completion) {
        match self.completions.try_send(completion) {
            Ok(()) => {}
            Err(TrySendError::Full(c) | TrySendError::Closed(c)) => {
                debug!(completion = ?c, "session already settling, completion dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_raiser_fits_without_a_reader() {
        let (signals, mut rx) = channel();
        for i in 0..FAILURE_SLOTS {
            signals.fail(Fault::Io(format!("fault {i}")));
        }
        // One too many is dropped, not blocked on.
        signals.fail(Fault::Io("late".into()));

        let mut seen = Vec::new();
        while let Ok(fault) = rx.faults.try_recv() {
            seen.push(fault);
        }
        assert_eq!(seen.len(), FAILURE_SLOTS);
        assert_eq!(seen[0], Fault::Io("fault 0".into()));
    }

    #[test]
    fn raising_after_receiver_dropped_is_harmless() {
        let (signals, rx) = channel();
        drop(rx);
        signals.fail(Fault::Transcoder("boom".into()));
        signals.complete(Completion::OutputEnded);
    }

    #[test]
    fn completions_are_kept_apart_from_faults() {
        let (signals, mut rx) = channel();
        signals.complete(Completion::PeerClosed);
        signals.complete(Completion::OutputEnded);
        assert!(rx.faults.try_recv().is_err());
        assert_eq!(rx.completions.try_recv().unwrap(), Completion::PeerClosed);
        assert_eq!(rx.completions.try_recv().unwrap(), Completion::OutputEnded);
    }
}
