#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Failure from the child-session history service. Never fatal: callers
/// treat it as "no changed files".
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history service unavailable: {0}")]
    Unavailable(String),
    #[error("session not found: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TokenizeError {
    #[error("tokenizer failed: {0}")]
    Failed(String),
}
