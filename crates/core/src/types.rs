use serde::{Deserialize, Serialize};

/// Handshake sent by the client as the first (text) frame of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub mime_type: String,
    /// Missing BPM is rejected during setup, not at parse time.
    #[serde(default)]
    pub bpm: Option<f64>,
}

impl Metadata {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Control frames the server sends alongside transcoded audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Progress { progress: f64 },
}

impl ServerMessage {
    pub fn progress(progress: f64) -> Self {
        Self::Progress { progress }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
