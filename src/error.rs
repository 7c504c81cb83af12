use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {endpoint}")]
    Status {
        endpoint: String,
        status: u16,
    },

    #[error("Response from {endpoint} did not match schema: {reason}")]
    Schema {
        endpoint: String,
        reason: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Local state IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session credential error: {0}")]
    Credential(String),

    #[error("Real-time channel closed")]
    ChannelClosed,
}

pub type ChatResult<T> = Result<T, ChatError>;
