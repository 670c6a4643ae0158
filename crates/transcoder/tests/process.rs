#![cfg(unix)]

use std::time::Duration;

use tagg_transcoder::TranscodeError;
use tagg_transcoder::monitor::DiagnosticClassifier;
use tagg_transcoder::process::{TranscodeCommand, TranscoderProcess};
use tagg_transcoder::signal::{self, Completion, Fault, Signals};
use tokio_util::sync::CancellationToken;

fn classifier() -> DiagnosticClassifier {
    DiagnosticClassifier::new(["error", "invalid"]).unwrap()
}

fn sh(script: &str) -> TranscodeCommand {
    TranscodeCommand::new("sh").args(["-c", script])
}

fn spawn(command: TranscodeCommand, signals: Signals) -> TranscoderProcess {
    TranscoderProcess::spawn(command, signals, classifier(), CancellationToken::new()).unwrap()
}

#[tokio::test]
async fn echoes_through_cat_and_completes_on_eof() {
    let (signals, mut rx) = signal::channel();
    let process = spawn(TranscodeCommand::new("cat"), signals);

    assert_eq!(process.input().write(b"hello tag").await.unwrap(), 9);

    let mut buf = [0u8; 64];
    let n = process.output().read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"hello tag");

    process.close().await;
    assert!(process.is_closed());
    assert!(rx.faults.try_recv().is_err());
}

#[tokio::test]
async fn output_eof_raises_completion_not_fault() {
    let (signals, mut rx) = signal::channel();
    let process = spawn(sh("printf done"), signals);

    let mut out = Vec::new();
    let mut buf = [0u8; 16];
    loop {
        let n = process.output().read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, b"done");
    assert_eq!(rx.completions.recv().await, Some(Completion::OutputEnded));
    assert!(rx.faults.try_recv().is_err());

    process.close().await;
}

#[tokio::test]
async fn write_failure_is_reported_once() {
    let (signals, mut rx) = signal::channel();
    // Closes its stdin but keeps stdout open.
    let process = spawn(sh("exec 0<&-; exec sleep 5"), signals);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let chunk = vec![0u8; 128 * 1024];
    assert!(process.input().write(&chunk).await.is_err());
    assert!(process.input().write(&chunk).await.is_err());

    assert!(matches!(rx.faults.recv().await, Some(Fault::Io(_))));
    assert!(rx.faults.try_recv().is_err());

    process.close().await;
}

#[tokio::test]
async fn fatal_diagnostic_reaches_fault_channel() {
    let (signals, mut rx) = signal::channel();
    let process = spawn(sh("echo 'Invalid argument' >&2; exec cat"), signals);

    let fault = tokio::time::timeout(Duration::from_secs(5), rx.faults.recv())
        .await
        .unwrap();
    assert_eq!(fault, Some(Fault::Transcoder("Invalid argument".into())));

    process.close().await;
}

#[tokio::test]
async fn close_is_idempotent() {
    let (signals, _rx) = signal::channel();
    let process = spawn(TranscodeCommand::new("cat"), signals);

    process.close().await;
    process.close().await;
    assert!(process.is_closed());

    // Pipes are gone after close.
    assert!(process.input().write(b"late").await.is_err());
    let mut buf = [0u8; 4];
    assert!(process.output().read(&mut buf).await.is_err());
}

#[tokio::test]
async fn concurrent_closes_release_once() {
    let (signals, _rx) = signal::channel();
    let process = std::sync::Arc::new(spawn(TranscodeCommand::new("cat"), signals));

    let a = tokio::spawn({
        let p = process.clone();
        async move { p.close().await }
    });
    let b = tokio::spawn({
        let p = process.clone();
        async move { p.close().await }
    });
    a.await.unwrap();
    b.await.unwrap();
    assert!(process.is_closed());
}

#[tokio::test]
async fn missing_binary_fails_to_spawn() {
    let (signals, mut rx) = signal::channel();
    let result = TranscoderProcess::spawn(
        TranscodeCommand::new("/definitely/not/a/transcoder"),
        signals,
        classifier(),
        CancellationToken::new(),
    );
    assert!(matches!(result, Err(TranscodeError::BinaryNotFound(_))));
    assert!(rx.faults.try_recv().is_err());
}

#[tokio::test]
async fn finishing_input_lets_the_transcoder_drain() {
    let (signals, mut rx) = signal::channel();
    let process = spawn(TranscodeCommand::new("cat"), signals);

    process.input().write(b"abc").await.unwrap();
    process.input().finish().await;
    process.input().finish().await;

    let mut out = Vec::new();
    let mut buf = [0u8; 8];
    loop {
        let n = process.output().read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, b"abc");
    assert_eq!(rx.completions.recv().await, Some(Completion::OutputEnded));

    process.close().await;
}
