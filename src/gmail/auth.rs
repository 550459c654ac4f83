//! OAuth credential bootstrap and token refresh for the Gmail API.
//!
//! Client credentials come from a JSON file; if the file is missing it is
//! created from a base64-encoded environment blob on first run. A persisted
//! token file holds the refresh token across restarts — the only durable
//! state in the process. Access tokens are refreshed against Google's token
//! endpoint and cached in memory until shortly before expiry.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::MailError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the reported expiry to avoid using a token
/// that dies mid-request.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth client credentials, in Google's `credentials.json` layout.
#[derive(Debug, Clone, Deserialize)]
struct CredentialsFile {
    installed: ClientSecrets,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
}

/// Persisted authorization token, in the layout Google's tooling writes.
#[derive(Debug, Clone, Deserialize)]
struct StoredToken {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Authenticator holding client secrets, the refresh token, and a cached
/// access token.
pub struct GmailAuth {
    secrets: ClientSecrets,
    refresh_token: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl GmailAuth {
    /// Bootstrap credentials and load the persisted token file.
    ///
    /// Fatal when either the credentials (file or base64 blob) or the token
    /// file are missing — the process must never run with a null provider
    /// handle.
    pub async fn bootstrap(
        credentials_path: &Path,
        credentials_base64: Option<&str>,
        token_path: &Path,
        http: reqwest::Client,
    ) -> Result<Self, MailError> {
        ensure_credentials_file(credentials_path, credentials_base64).await?;

        let creds_raw = tokio::fs::read_to_string(credentials_path).await?;
        let creds: CredentialsFile = serde_json::from_str(&creds_raw)
            .map_err(|e| MailError::Bootstrap(format!("invalid credentials file: {e}")))?;

        let token_raw = tokio::fs::read_to_string(token_path).await.map_err(|e| {
            MailError::Bootstrap(format!(
                "cannot read token file {}: {e}. Provision an authorized token file first.",
                token_path.display()
            ))
        })?;
        let token: StoredToken = serde_json::from_str(&token_raw)
            .map_err(|e| MailError::Bootstrap(format!("invalid token file: {e}")))?;

        Ok(Self {
            secrets: creds.installed,
            refresh_token: token.refresh_token,
            http,
            cached: Mutex::new(None),
        })
    }

    /// Return a valid access token, refreshing when the cache is empty or
    /// close to expiry.
    pub async fn access_token(&self) -> Result<String, MailError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && Utc::now() + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < token.expires_at
        {
            return Ok(token.access_token.clone());
        }

        let params = [
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let resp = self
            .http
            .post(GOOGLE_TOKEN_URL)
            .form(&params)
            .send()
            .await
            .map_err(|e| MailError::TokenRefresh(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::TokenRefresh(format!("{status}: {body}")));
        }

        let refreshed: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| MailError::TokenRefresh(format!("bad token response: {e}")))?;

        let expires_at =
            Utc::now() + ChronoDuration::seconds(refreshed.expires_in.unwrap_or(3600) as i64);

        tracing::debug!(expires_at = %expires_at, "Refreshed Gmail access token");

        let token = CachedToken {
            access_token: refreshed.access_token,
            expires_at,
        };
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }
}

/// Write the credentials file from the base64 blob when it does not exist
/// yet. An already-present file wins over the blob.
async fn ensure_credentials_file(
    path: &Path,
    base64_blob: Option<&str>,
) -> Result<(), MailError> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(());
    }

    let Some(blob) = base64_blob else {
        return Err(MailError::Bootstrap(format!(
            "credentials file {} not found and GMAIL_CREDENTIALS_BASE64 not set",
            path.display()
        )));
    };

    let decoded = STANDARD
        .decode(blob.trim())
        .map_err(|e| MailError::Bootstrap(format!("failed to decode credentials blob: {e}")))?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &decoded).await?;
    tracing::info!(path = %path.display(), "Created credentials file from environment blob");
    Ok(())
}
