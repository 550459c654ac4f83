//! Error types for inbox-pilot, one enum per concern. Each seam returns
//! its own error; nothing ever needs to hold "any of these" at once.

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail provider errors — credential bootstrap, polling, and sending.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Credential bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Gmail API request failed ({endpoint}): {reason}")]
    Api { endpoint: String, reason: String },

    #[error("Mail provider call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Draft generation errors (language-model call failures).
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("Model request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),

    #[error("Model call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Notifier errors — Telegram delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),

    #[error("Notifier call timed out after {0:?}")]
    Timeout(std::time::Duration),
}
