use std::fmt;

#[derive(Debug)]
pub enum EdgeLinkError {
    SqliteError(rusqlite::Error),
    JsonError(String),
    IO(String),
    Storage(String),
    Transport(String),
    Config(String),
    NotConnected,
    NotInitialized(String),
    ShuttingDown(String),
    InvalidData(String),
    InvalidOperation(String),
    Timeout(String),
    Other(String),
}

impl fmt::Display for EdgeLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeLinkError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            EdgeLinkError::JsonError(e) => write!(f, "JSON error: {}", e),
            EdgeLinkError::IO(e) => write!(f, "IO error: {}", e),
            EdgeLinkError::Storage(e) => write!(f, "Storage error: {}", e),
            EdgeLinkError::Transport(e) => write!(f, "Transport error: {}", e),
            EdgeLinkError::Config(e) => write!(f, "Config error: {}", e),
            EdgeLinkError::NotConnected => write!(f, "Not connected"),
            EdgeLinkError::NotInitialized(e) => write!(f, "Not initialized: {}", e),
            EdgeLinkError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
            EdgeLinkError::InvalidData(e) => write!(f, "Invalid data: {}", e),
            EdgeLinkError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            EdgeLinkError::Timeout(e) => write!(f, "Timeout: {}", e),
            EdgeLinkError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for EdgeLinkError {}

impl From<rusqlite::Error> for EdgeLinkError {
    fn from(error: rusqlite::Error) -> Self {
        EdgeLinkError::SqliteError(error)
    }
}

impl From<serde_json::Error> for EdgeLinkError {
    fn from(error: serde_json::Error) -> Self {
        EdgeLinkError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for EdgeLinkError {
    fn from(error: std::io::Error) -> Self {
        EdgeLinkError::IO(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EdgeLinkError>;

/// 把错误链压平成一行，用于下行回执的 error_msg
///
/// 从外层到根因依次拼接，云端只要一个可读字符串。
pub fn flatten_cause(error: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
