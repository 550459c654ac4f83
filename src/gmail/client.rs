//! Gmail REST API client.
//!
//! Talks to `gmail.googleapis.com` directly over reqwest with a bearer
//! token from [`GmailAuth`]. Outbound replies are RFC 2822 messages,
//! base64url-encoded into the `raw` field of `messages/send`.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::error::MailError;
use crate::gmail::auth::GmailAuth;
use crate::gmail::types::{self, InboxItem, NO_SUBJECT, WatchCursor};
use crate::gmail::MailProvider;

const GMAIL_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail REST client.
pub struct GmailClient {
    auth: Arc<GmailAuth>,
    http: reqwest::Client,
}

impl GmailClient {
    pub fn new(auth: Arc<GmailAuth>, http: reqwest::Client) -> Self {
        Self { auth, http }
    }

    async fn get_json(&self, endpoint: &str, url: &str) -> Result<Value, MailError> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| api_err(endpoint, e.to_string()))?;
        read_json(endpoint, resp).await
    }

    async fn post_json(
        &self,
        endpoint: &str,
        url: &str,
        body: &Value,
    ) -> Result<Value, MailError> {
        let token = self.auth.access_token().await?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await
            .map_err(|e| api_err(endpoint, e.to_string()))?;
        read_json(endpoint, resp).await
    }

    /// Fetch full metadata for one message and build an [`InboxItem`].
    async fn get_item(&self, message_id: &str) -> Result<InboxItem, MailError> {
        let url = format!(
            "{GMAIL_BASE}/messages/{message_id}?format=metadata\
             &metadataHeaders=From&metadataHeaders=Subject"
        );
        let msg = self.get_json("messages.get", &url).await?;
        Ok(parse_message(&msg))
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn fetch_latest_unread(
        &self,
        cursor: WatchCursor,
    ) -> Result<Option<InboxItem>, MailError> {
        let query = unread_query(cursor);
        let url = format!(
            "{GMAIL_BASE}/messages?labelIds=INBOX&maxResults=1&q={}",
            urlencode(&query)
        );
        let listing = self.get_json("messages.list", &url).await?;

        let Some(id) = listing
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|msgs| msgs.first())
            .and_then(|m| m.get("id"))
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };

        Ok(Some(self.get_item(id).await?))
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
        let url = format!("{GMAIL_BASE}/messages/{message_id}/modify");
        let body = serde_json::json!({ "removeLabelIds": ["UNREAD"] });
        // Gmail treats removing an absent label as success, so re-marking
        // an already-read message falls through here cleanly.
        self.post_json("messages.modify", &url, &body).await?;
        Ok(())
    }

    async fn send_reply(&self, item: &InboxItem, body: &str) -> Result<(), MailError> {
        let raw = encode_reply(item, body);

        let mut payload = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = &item.thread_id {
            payload["threadId"] = Value::String(thread_id.clone());
        }

        let url = format!("{GMAIL_BASE}/messages/send");
        let sent = self.post_json("messages.send", &url, &payload).await?;
        let sent_id = sent
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::info!(to = %item.reply_address(), id = sent_id, "Reply sent");
        Ok(())
    }
}

/// Gmail search query for unread mail newer than the watch cursor.
fn unread_query(cursor: WatchCursor) -> String {
    format!("is:unread after:{}", cursor.unix_secs())
}

/// Build an [`InboxItem`] from a `messages.get` response.
fn parse_message(msg: &Value) -> InboxItem {
    let headers = msg
        .pointer("/payload/headers")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let header = |name: &str| -> Option<String> {
        headers
            .iter()
            .find(|h| h.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|h| h.get("value"))
            .and_then(Value::as_str)
            .map(String::from)
    };

    InboxItem {
        id: msg
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        thread_id: msg
            .get("threadId")
            .and_then(Value::as_str)
            .map(String::from),
        sender: header("From").unwrap_or_else(|| "Unknown".to_string()),
        subject: header("Subject").unwrap_or_else(|| NO_SUBJECT.to_string()),
        snippet: msg
            .get("snippet")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

/// Encode a reply to `item` as a base64url RFC 2822 message.
fn encode_reply(item: &InboxItem, body: &str) -> String {
    let message = format!(
        "To: {}\r\nSubject: {}\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\n\r\n{}",
        item.reply_address(),
        types::reply_subject(&item.subject),
        body
    );
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

async fn read_json(endpoint: &str, resp: reqwest::Response) -> Result<Value, MailError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(api_err(endpoint, format!("{status}: {text}")));
    }
    resp.json()
        .await
        .map_err(|e| api_err(endpoint, format!("bad response body: {e}")))
}

fn api_err(endpoint: &str, reason: String) -> MailError {
    MailError::Api {
        endpoint: endpoint.to_string(),
        reason,
    }
}

/// Percent-encode a query value for the Gmail search `q` parameter.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => out.push(c),
            _ => {
                for b in c.to_string().as_bytes() {
                    out.push_str(&format!("%{b:02X}"));
                }
            }
        }
    }
    out
}
