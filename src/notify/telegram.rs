//! Telegram notifier — raw Bot API over reqwest.
//!
//! Outbound messages try Markdown first and fall back to plain text, and
//! are split to fit Telegram's 4096-character limit. Inbound updates come
//! from either a long-poll loop against `getUpdates` or the webhook server
//! in [`crate::server`]; both feed the same [`parse_update`] path.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::NotifyError;
use crate::notify::{Choice, Notifier};

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// An update from the operator, already filtered to the configured chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundUpdate {
    /// The operator sent `/start`.
    Start,
    /// The operator tapped a notification button.
    Action {
        /// Callback query id, acknowledged via `answerCallbackQuery`.
        callback_id: String,
        /// Raw action identifier from the button.
        data: String,
    },
}

/// Telegram notifier bound to a single operator chat.
pub struct TelegramNotifier {
    bot_token: SecretString,
    chat_id: i64,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: i64, client: reqwest::Client) -> Self {
        Self {
            bot_token,
            chat_id,
            client,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Send a text message, splitting chunks that exceed the API limit.
    async fn send_message(
        &self,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), NotifyError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            // The keyboard goes on the final chunk so it sits under the text.
            let markup = if i == last { reply_markup.clone() } else { None };
            self.send_message_chunk(chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single chunk, Markdown-first with plain-text fallback.
    async fn send_message_chunk(
        &self,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), NotifyError> {
        let mut markdown_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(markup) = &reply_markup {
            markdown_body["reply_markup"] = markup.clone();
        }

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if let Some(markup) = &reply_markup {
            plain_body["reply_markup"] = markup.clone();
        }

        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "sendMessage failed (markdown: {markdown_status}, plain: {plain_err})"
            )));
        }

        Ok(())
    }

    /// Acknowledge a tapped button so the operator's client stops spinning.
    pub async fn answer_callback(&self, callback_id: &str) {
        let body = serde_json::json!({ "callback_query_id": callback_id });
        if let Err(e) = self
            .client
            .post(self.api_url("answerCallbackQuery"))
            .json(&body)
            .send()
            .await
        {
            tracing::warn!("answerCallbackQuery failed: {e}");
        }
    }

    /// Spawn a long-poll loop against `getUpdates`, forwarding operator
    /// updates into the returned channel. The loop exits when the receiver
    /// is dropped.
    pub fn spawn_update_listener(&self) -> mpsc::UnboundedReceiver<InboundUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        let bot_token = self.bot_token.clone();
        let chat_id = self.chat_id;
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram long-poll listener started");

            loop {
                let url = format!(
                    "https://api.telegram.org/bot{}/getUpdates",
                    bot_token.expose_secret()
                );
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"],
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                if let Some(results) = data.get("result").and_then(Value::as_array) {
                    for update in results {
                        if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                            offset = uid + 1;
                        }

                        let Some(inbound) = parse_update(update, chat_id) else {
                            continue;
                        };

                        if tx.send(inbound).is_err() {
                            tracing::info!("Telegram listener channel closed");
                            return;
                        }
                    }
                }
            }
        });

        rx
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        self.send_message(text, None).await
    }

    async fn prompt(&self, text: &str, choices: &[Choice]) -> Result<(), NotifyError> {
        self.send_message(text, Some(inline_keyboard(choices))).await
    }

    async fn ack_action(&self, action_token: &str) -> Result<(), NotifyError> {
        self.answer_callback(action_token).await;
        Ok(())
    }
}

/// Build an inline keyboard payload, one button per row.
fn inline_keyboard(choices: &[Choice]) -> Value {
    let rows: Vec<Value> = choices
        .iter()
        .map(|c| serde_json::json!([{ "text": c.label, "callback_data": c.action_id }]))
        .collect();
    serde_json::json!({ "inline_keyboard": rows })
}

/// Parse one Bot API update into an [`InboundUpdate`].
///
/// Updates from any chat other than the configured operator, and update
/// kinds the workflow has no use for, are dropped with a log line.
pub fn parse_update(update: &Value, operator_chat_id: i64) -> Option<InboundUpdate> {
    if let Some(callback) = update.get("callback_query") {
        let from_chat = callback
            .pointer("/message/chat/id")
            .or_else(|| callback.pointer("/from/id"))
            .and_then(Value::as_i64);
        if from_chat != Some(operator_chat_id) {
            tracing::warn!(chat = ?from_chat, "Ignoring callback from unknown chat");
            return None;
        }

        let callback_id = callback.get("id").and_then(Value::as_str)?.to_string();
        let data = callback.get("data").and_then(Value::as_str)?.to_string();
        return Some(InboundUpdate::Action { callback_id, data });
    }

    if let Some(message) = update.get("message") {
        let from_chat = message.pointer("/chat/id").and_then(Value::as_i64);
        if from_chat != Some(operator_chat_id) {
            tracing::warn!(chat = ?from_chat, "Ignoring message from unknown chat");
            return None;
        }

        let text = message.get("text").and_then(Value::as_str)?;
        if text.trim() == "/start" {
            return Some(InboundUpdate::Start);
        }
    }

    None
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Snap the cut to a char boundary so multibyte text never splits
        // mid-character.
        let mut limit = max_len;
        while limit > 0 && !remaining.is_char_boundary(limit) {
            limit -= 1;
        }
        if limit == 0 {
            // First char alone exceeds the limit; emit it whole.
            limit = remaining
                .chars()
                .next()
                .map_or(remaining.len(), char::len_utf8);
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPERATOR: i64 = 990011;

    fn notifier() -> TelegramNotifier {
        TelegramNotifier::new(
            SecretString::from("123:ABC"),
            OPERATOR,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn api_url_embeds_token_and_method() {
        assert_eq!(
            notifier().api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    // ── Update parsing ──────────────────────────────────────────────

    #[test]
    fn parse_callback_query_from_operator() {
        let update = serde_json::json!({
            "update_id": 7,
            "callback_query": {
                "id": "cb-42",
                "from": { "id": OPERATOR },
                "message": { "chat": { "id": OPERATOR } },
                "data": "professional"
            }
        });
        assert_eq!(
            parse_update(&update, OPERATOR),
            Some(InboundUpdate::Action {
                callback_id: "cb-42".into(),
                data: "professional".into(),
            })
        );
    }

    #[test]
    fn parse_callback_query_from_stranger_is_dropped() {
        let update = serde_json::json!({
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 5555 },
                "message": { "chat": { "id": 5555 } },
                "data": "confirm_send"
            }
        });
        assert_eq!(parse_update(&update, OPERATOR), None);
    }

    #[test]
    fn parse_callback_without_message_falls_back_to_from_id() {
        let update = serde_json::json!({
            "callback_query": {
                "id": "cb-2",
                "from": { "id": OPERATOR },
                "data": "cancel_send"
            }
        });
        assert_eq!(
            parse_update(&update, OPERATOR),
            Some(InboundUpdate::Action {
                callback_id: "cb-2".into(),
                data: "cancel_send".into(),
            })
        );
    }

    #[test]
    fn parse_start_command() {
        let update = serde_json::json!({
            "message": {
                "chat": { "id": OPERATOR },
                "text": "/start"
            }
        });
        assert_eq!(parse_update(&update, OPERATOR), Some(InboundUpdate::Start));
    }

    #[test]
    fn parse_plain_message_is_dropped() {
        let update = serde_json::json!({
            "message": {
                "chat": { "id": OPERATOR },
                "text": "hello bot"
            }
        });
        assert_eq!(parse_update(&update, OPERATOR), None);
    }

    #[test]
    fn parse_message_from_stranger_is_dropped() {
        let update = serde_json::json!({
            "message": {
                "chat": { "id": 12345 },
                "text": "/start"
            }
        });
        assert_eq!(parse_update(&update, OPERATOR), None);
    }

    #[test]
    fn parse_empty_update_is_dropped() {
        assert_eq!(parse_update(&serde_json::json!({}), OPERATOR), None);
    }

    // ── Keyboard payload ────────────────────────────────────────────

    #[test]
    fn inline_keyboard_one_button_per_row() {
        let markup = inline_keyboard(&crate::notify::CONFIRM_CHOICES);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0]["text"], "✅ Yes, Send");
        assert_eq!(rows[0][0]["callback_data"], "confirm_send");
        assert_eq!(rows[1][0]["callback_data"], "cancel_send");
    }

    #[test]
    fn tone_keyboard_carries_all_four_actions() {
        let markup = inline_keyboard(&crate::notify::TONE_CHOICES);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        let actions: Vec<&str> = rows
            .iter()
            .map(|r| r[0]["callback_data"].as_str().unwrap())
            .collect();
        assert_eq!(actions, ["professional", "casual", "friendly", "ignore"]);
    }

    // ── Message splitting ───────────────────────────────────────────

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_multibyte_never_cuts_mid_char() {
        // 3-byte chars, so 4096 lands inside a character.
        let msg = "日".repeat(2000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
        assert_eq!(chunks.concat(), msg);
    }
}
