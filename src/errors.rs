use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NavPlaneError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Navigation already in progress")]
    AlreadyExecuting,

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No UI peer connected")]
    NoPeerConnected,

    #[error("Peer disconnected before answering")]
    PeerDisconnected,

    #[error("Action timed out after {}ms", .0.as_millis())]
    ActionTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("MCP error: {0}")]
    Mcp(#[from] rmcp::RmcpError),
}

impl serde::Serialize for NavPlaneError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type NavResult<T> = Result<T, NavPlaneError>;
