//! Operator notification seam, its Telegram implementation, and update
//! dispatch shared by both ingestion paths.

pub mod telegram;

pub use telegram::{InboundUpdate, TelegramNotifier};

use async_trait::async_trait;

use crate::error::NotifyError;
use crate::workflow::Workflow;

/// Greeting sent when the operator issues `/start`.
pub const GREETING: &str = "👋 Hello! I'm your email assistant bot.\n\
     I'll notify you of new emails and help you reply directly from Telegram.";

/// A labeled action offered to the operator on a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    /// Button label shown to the operator.
    pub label: &'static str,
    /// Raw action identifier delivered back when tapped.
    pub action_id: &'static str,
}

/// Delivers notifications (with optional selectable actions) to the single
/// operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Plain status message.
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;

    /// Message with selectable actions rendered as buttons.
    async fn prompt(&self, text: &str, choices: &[Choice]) -> Result<(), NotifyError>;

    /// Acknowledge receipt of an operator action so the client UI settles.
    /// No-op by default; Telegram answers the callback query.
    async fn ack_action(&self, _action_token: &str) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Tone-selection keyboard offered when a new item is surfaced.
pub const TONE_CHOICES: [Choice; 4] = [
    Choice {
        label: "Professional",
        action_id: "professional",
    },
    Choice {
        label: "Casual",
        action_id: "casual",
    },
    Choice {
        label: "Friendly",
        action_id: "friendly",
    },
    Choice {
        label: "Ignore",
        action_id: "ignore",
    },
];

/// Send/cancel keyboard offered once a draft is ready.
pub const CONFIRM_CHOICES: [Choice; 2] = [
    Choice {
        label: "✅ Yes, Send",
        action_id: "confirm_send",
    },
    Choice {
        label: "❌ No, Cancel",
        action_id: "cancel_send",
    },
];

/// Route one parsed operator update into the workflow. Used identically by
/// the long-poll loop and the webhook handler.
pub async fn dispatch_update(update: InboundUpdate, notifier: &dyn Notifier, workflow: &Workflow) {
    match update {
        InboundUpdate::Start => {
            if let Err(e) = notifier.notify(GREETING).await {
                tracing::warn!("Failed to send greeting: {e}");
            }
        }
        InboundUpdate::Action { callback_id, data } => {
            if let Err(e) = notifier.ack_action(&callback_id).await {
                tracing::warn!("Failed to acknowledge action: {e}");
            }
            workflow.on_action(&data).await;
        }
    }
}
