use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tagg_server::auth::issue_token;
use tagg_server::config::SessionConfig;
use tagg_server::routes::build_router;
use tagg_server::state::AppState;
use tagg_server::watermark::DirectoryWatermarks;
use tagg_transcoder::launcher::Launcher;
use tagg_transcoder::monitor::DiagnosticClassifier;
use tagg_transcoder::process::TranscodeCommand;
use tagg_transcoder::tag::TagParameters;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

const SECRET: &str = "test-secret-key";

/// Echoes the upload back unchanged.
struct CatLauncher;

impl Launcher for CatLauncher {
    fn command(&self, _tag: &TagParameters, _watermark: &Path) -> TranscodeCommand {
        TranscodeCommand::new("cat")
    }
}

fn watermark_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tagg_it_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("default.wav"), b"RIFF").unwrap();
    dir
}

fn test_state(jwt_secret: Option<&str>) -> AppState {
    let dir = watermark_dir();
    AppState {
        jwt_secret: jwt_secret.map(String::from),
        launcher: Arc::new(CatLauncher),
        classifier: DiagnosticClassifier::new(["error", "invalid"]).unwrap(),
        watermarks: Arc::new(DirectoryWatermarks::new(&dir, dir.join("default.wav"))),
        session: SessionConfig {
            deadline: Duration::from_secs(10),
            ..Default::default()
        },
        capabilities: Default::default(),
        shutdown: CancellationToken::new(),
    }
}

fn test_app(jwt_secret: Option<&str>) -> TestServer {
    TestServer::new(build_router(test_state(jwt_secret))).unwrap()
}

#[tokio::test]
async fn health_endpoint_returns_ok() {
    let server = test_app(None);
    let resp = server.get("/health").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["ffmpeg"]["available"], false);
}

#[tokio::test]
async fn upgrade_without_token_is_rejected() {
    let server = test_app(Some(SECRET));
    let resp = server.get("/api/ws").await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn upgrade_with_bad_token_is_rejected() {
    let server = test_app(Some(SECRET));
    let token = issue_token("u1", "alice", "some-other-secret", chrono::Duration::hours(1)).unwrap();
    let resp = server
        .get("/api/ws")
        .add_header(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse::<axum::http::HeaderValue>().unwrap(),
        )
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upgrade_with_wrong_scheme_is_rejected() {
    let server = test_app(Some(SECRET));
    let resp = server
        .get("/api/ws")
        .add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        )
        .await;
    resp.assert_status(StatusCode::UNAUTHORIZED);
}

#[cfg(unix)]
#[tokio::test]
async fn websocket_session_round_trip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(test_state(Some(SECRET)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let token = issue_token("u1", "alice", SECRET, chrono::Duration::hours(1)).unwrap();
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/ws?token={token}"))
        .await
        .unwrap();

    let upload: Vec<u8> = (0..4096u32).map(|i| (i % 253) as u8).collect();
    let metadata = json!({
        "fileSize": upload.len(),
        "fileName": "loop.wav",
        "mimeType": "audio/wav",
        "bpm": 128,
    });
    ws.send(Message::Text(metadata.to_string().into())).await.unwrap();
    for chunk in upload.chunks(1024) {
        ws.send(Message::Binary(chunk.to_vec().into())).await.unwrap();
    }

    let mut audio = Vec::new();
    let mut progress = Vec::new();
    let mut close_code = None;
    while let Some(message) = tokio::time::timeout(Duration::from_secs(10), ws.next())
        .await
        .expect("server stalled")
    {
        match message {
            Ok(Message::Binary(bytes)) => audio.extend_from_slice(&bytes),
            Ok(Message::Text(text)) => {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                progress.push(value["progress"].as_f64().unwrap());
            }
            Ok(Message::Close(frame)) => {
                close_code = frame.map(|f| u16::from(f.code));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    assert_eq!(audio, upload);
    assert_eq!(progress, vec![25.0, 50.0, 75.0, 100.0]);
    assert_eq!(close_code, Some(1000));
}
