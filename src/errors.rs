use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

impl AppError {
    /// Only configuration problems stop the process; everything else is
    /// recovered inside the monitoring session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Config(_) | AppError::UrlParse(_))
    }

    /// Whether the failure belongs to the connection itself and should
    /// send the supervisor into `Reconnecting`.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Transport(_) | AppError::WebSocket(_) | AppError::Io(_)
        )
    }
}
