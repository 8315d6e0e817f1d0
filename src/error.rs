use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipeSpanError {
    #[error("GitLab API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("GitLab API error (status {status}) after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Credential lookup failed: {0}")]
    Credential(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Diagram rendering failed: {0}")]
    Render(String),

    #[error("Trace export failed (status {status}): {message}")]
    Export { status: u16, message: String },

    #[error("Trace export failed: {0}")]
    ExportEncoding(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PipeSpanError>;
