//! Configuration, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// How Telegram updates reach the process. Exactly one path is active
/// per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingestion {
    /// Long-poll the Bot API `getUpdates` endpoint.
    LongPoll,
    /// Serve an HTTP webhook on this port and let Telegram push updates.
    Webhook { port: u16 },
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token (secret).
    pub bot_token: SecretString,
    /// The single operator chat that receives notifications and may act.
    pub operator_chat_id: i64,
    /// OpenAI API key (secret).
    pub openai_api_key: SecretString,
    /// Chat-completions model used for drafting.
    pub openai_model: String,
    /// Path to the Gmail OAuth client credentials file.
    pub credentials_path: PathBuf,
    /// Optional base64-encoded credentials blob, decoded to
    /// `credentials_path` on first run.
    pub credentials_base64: Option<String>,
    /// Path to the persisted authorization token file (the only durable
    /// state; reused across restarts).
    pub token_path: PathBuf,
    /// Fixed delay between mailbox poll cycles.
    pub poll_interval: Duration,
    /// Upper bound on every external call (mail, model, notifier).
    pub call_timeout: Duration,
    /// Name substituted into drafts and used in the signature block.
    pub signer_name: String,
    /// Active update ingestion path.
    pub ingestion: Ingestion,
}

impl Config {
    /// Build config from environment variables.
    ///
    /// Missing required variables are fatal; optional ones fall back to
    /// documented defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = require_env("TELEGRAM_BOT_TOKEN")?;

        let operator_chat_id: i64 = require_env("TELEGRAM_CHAT_ID")?
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "TELEGRAM_CHAT_ID".into(),
                message: format!("expected an integer chat id: {e}"),
            })?;

        let openai_api_key = require_env("OPENAI_API_KEY")?;

        let openai_model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let credentials_path = std::env::var("GMAIL_CREDENTIALS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("credentials.json"));

        let credentials_base64 = std::env::var("GMAIL_CREDENTIALS_BASE64").ok();

        let token_path = std::env::var("GMAIL_TOKEN_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("token.json"));

        let poll_interval_secs: u64 = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        let call_timeout_secs: u64 = std::env::var("CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let signer_name =
            std::env::var("SIGNER_NAME").unwrap_or_else(|_| "Mail Pilot".to_string());

        let ingestion = match std::env::var("WEBHOOK_PORT") {
            Ok(raw) => {
                let port = raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "WEBHOOK_PORT".into(),
                    message: format!("expected a port number: {e}"),
                })?;
                Ingestion::Webhook { port }
            }
            Err(_) => Ingestion::LongPoll,
        };

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            operator_chat_id,
            openai_api_key: SecretString::from(openai_api_key),
            openai_model,
            credentials_path,
            credentials_base64,
            token_path,
            poll_interval: Duration::from_secs(poll_interval_secs),
            call_timeout: Duration::from_secs(call_timeout_secs),
            signer_name,
            ingestion,
        })
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_env_reports_missing_key() {
        let err = require_env("INBOX_PILOT_DOES_NOT_EXIST").unwrap_err();
        match err {
            ConfigError::MissingEnvVar(key) => {
                assert_eq!(key, "INBOX_PILOT_DOES_NOT_EXIST");
            }
            other => panic!("Expected MissingEnvVar, got: {other}"),
        }
    }

    #[test]
    fn ingestion_variants_compare() {
        assert_eq!(Ingestion::LongPoll, Ingestion::LongPoll);
        assert_ne!(Ingestion::LongPoll, Ingestion::Webhook { port: 8443 });
    }
}
