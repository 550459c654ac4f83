//! Draft generation — tones, the generator seam, and the OpenAI client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::DraftError;
use crate::gmail::InboxItem;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_COMPLETION_TOKENS: u32 = 300;

/// Placeholder tokens some models leave in place of the signer's name.
const NAME_PLACEHOLDERS: [&str; 3] = ["[YOUR_NAME]", "<YOUR_NAME>", "{YOUR_NAME}"];

/// Reply style selected by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    Professional,
    Casual,
    Friendly,
}

impl Tone {
    /// Raw action identifier used on notification buttons.
    pub fn action_id(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Friendly => "friendly",
        }
    }

    /// Human-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Professional => "Professional",
            Self::Casual => "Casual",
            Self::Friendly => "Friendly",
        }
    }

    pub const ALL: [Tone; 3] = [Tone::Professional, Tone::Casual, Tone::Friendly];
}

impl std::fmt::Display for Tone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action_id())
    }
}

impl std::str::FromStr for Tone {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "professional" => Ok(Self::Professional),
            "casual" => Ok(Self::Casual),
            "friendly" => Ok(Self::Friendly),
            _ => Err(format!("Unknown tone: {s}")),
        }
    }
}

/// A generated reply awaiting the operator's send decision.
///
/// Valid only while `target_item_id` still matches the current pending
/// inbox item; superseding the item invalidates the draft.
#[derive(Debug, Clone)]
pub struct Draft {
    pub tone: Tone,
    pub body: String,
    pub target_item_id: String,
}

/// The language-model seam consumed by the workflow core.
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    /// Generate reply text for the item in the given tone. The returned
    /// body always ends with the fixed signature block and contains no
    /// residual name placeholders.
    async fn generate(&self, tone: Tone, item: &InboxItem) -> Result<String, DraftError>;
}

// ── OpenAI implementation ───────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Draft generator backed by the OpenAI chat-completions API.
pub struct OpenAiDraftGenerator {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    signer_name: String,
}

impl OpenAiDraftGenerator {
    pub fn new(
        http: reqwest::Client,
        api_key: SecretString,
        model: String,
        signer_name: String,
    ) -> Self {
        Self {
            http,
            api_key,
            model,
            signer_name,
        }
    }

    fn user_prompt(&self, tone: Tone, item: &InboxItem) -> String {
        format!(
            "Draft a {tone} email reply to the following message. \
             Always end the reply with:\n\n{signature}\n\n\
             Replace any placeholders like [YOUR_NAME] with the literal name {signer}.\n\n\
             From: {sender}\nSubject: {subject}\nMessage: {snippet}",
            tone = tone.label(),
            signature = signature(&self.signer_name),
            signer = self.signer_name,
            sender = item.sender,
            subject = item.subject,
            snippet = item.snippet,
        )
    }
}

#[async_trait]
impl DraftGenerator for OpenAiDraftGenerator {
    async fn generate(&self, tone: Tone, item: &InboxItem) -> Result<String, DraftError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You write concise, tone-specific email replies ending with \
                              a proper signature."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: self.user_prompt(tone, item),
                },
            ],
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let resp = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| DraftError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DraftError::RequestFailed(format!("{status}: {body}")));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| DraftError::InvalidResponse(e.to_string()))?;

        let text = chat
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| DraftError::InvalidResponse("no completion choices".into()))?;

        Ok(finalize_draft(&text, &self.signer_name))
    }
}

/// The fixed signature block every draft ends with.
pub fn signature(signer_name: &str) -> String {
    format!("Best regards,\n{signer_name}")
}

/// Substitute name placeholders and guarantee the signature terminates the
/// body, appending it when the model left it off.
pub fn finalize_draft(text: &str, signer_name: &str) -> String {
    let mut body = text.trim().to_string();
    for placeholder in NAME_PLACEHOLDERS {
        body = body.replace(placeholder, signer_name);
    }

    let sig = signature(signer_name);
    if !body.ends_with(&sig) {
        body.push_str("\n\n");
        body.push_str(&sig);
    }
    body
}
