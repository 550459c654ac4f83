//! Workflow core — the watch / draft / confirm state machine.
//!
//! Tracks exactly one pending inbox item and its pending draft across two
//! decoupled triggers: the mailbox poller (new-item-arrived) and the
//! notifier's action callback (tone-chosen / confirmed / cancelled). All
//! state lives behind one mutex and every transition runs as a critical
//! section, so a poller hit can never interleave with an operator action
//! mid-update. Sending mail happens here and nowhere else, and only after
//! an explicit confirmation whose draft still targets the pending item.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::draft::{Draft, DraftGenerator, Tone};
use crate::error::{DraftError, MailError, NotifyError};
use crate::gmail::{InboxItem, MailProvider};
use crate::notify::{CONFIRM_CHOICES, Notifier, TONE_CHOICES};

/// Observable state, derived from the pending item/draft pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    /// No pending item.
    Idle,
    /// Item surfaced, waiting for a tone choice.
    AwaitingTone,
    /// Draft generated, waiting for the send/cancel decision.
    AwaitingConfirmation,
}

/// Semantic event behind a raw action identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ToneChosen(Tone),
    Confirmed,
    Cancelled,
}

impl Action {
    /// Fixed lookup table from raw action identifiers to events.
    /// Unrecognized identifiers map to `None` and must cause no
    /// state change.
    pub fn from_callback(raw: &str) -> Option<Self> {
        match raw {
            "professional" => Some(Self::ToneChosen(Tone::Professional)),
            "casual" => Some(Self::ToneChosen(Tone::Casual)),
            "friendly" => Some(Self::ToneChosen(Tone::Friendly)),
            "confirm_send" => Some(Self::Confirmed),
            "cancel_send" | "ignore" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Inner {
    pending: Option<InboxItem>,
    draft: Option<Draft>,
}

impl Inner {
    fn state(&self) -> WorkflowState {
        match (&self.pending, &self.draft) {
            (None, _) => WorkflowState::Idle,
            (Some(_), None) => WorkflowState::AwaitingTone,
            (Some(_), Some(_)) => WorkflowState::AwaitingConfirmation,
        }
    }
}

/// The single owner of the pending item/draft pair.
pub struct Workflow {
    mail: Arc<dyn MailProvider>,
    drafts: Arc<dyn DraftGenerator>,
    notifier: Arc<dyn Notifier>,
    /// Upper bound on each external call; a hung provider or model call
    /// must not stall the core forever.
    call_timeout: Duration,
    inner: Mutex<Inner>,
}

impl Workflow {
    pub fn new(
        mail: Arc<dyn MailProvider>,
        drafts: Arc<dyn DraftGenerator>,
        notifier: Arc<dyn Notifier>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            mail,
            drafts,
            notifier,
            call_timeout,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Current state.
    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.state()
    }

    /// Id of the pending item, when one exists.
    pub async fn pending_item_id(&self) -> Option<String> {
        self.inner.lock().await.pending.as_ref().map(|i| i.id.clone())
    }

    /// A new inbox item arrived. Last write wins: any pending item and any
    /// outstanding draft are superseded, and the operator is (re-)prompted
    /// for a tone.
    pub async fn on_new_item(&self, item: InboxItem) {
        let mut inner = self.inner.lock().await;

        if let Some(old) = &inner.pending {
            info!(old = %old.id, new = %item.id, "Superseding pending item");
        }
        if inner.draft.take().is_some() {
            info!("Discarded outstanding draft for superseded item");
        }

        let text = format!(
            "📬 *New Email!*\n*From:* {}\n*Subject:* {}\n*Snippet:* {}",
            item.sender, item.subject, item.snippet
        );
        inner.pending = Some(item);

        self.prompt(&text, &TONE_CHOICES).await;
    }

    /// Dispatch a raw action identifier from the notifier. Unknown
    /// identifiers are rejected without any state change.
    pub async fn on_action(&self, raw: &str) {
        match Action::from_callback(raw) {
            Some(Action::ToneChosen(tone)) => self.on_tone_chosen(tone).await,
            Some(Action::Confirmed) => self.on_confirmed().await,
            Some(Action::Cancelled) => self.on_cancelled().await,
            None => {
                warn!(action = %raw, "Rejecting unrecognized action identifier");
            }
        }
    }

    /// The operator picked a tone: generate a draft for the pending item
    /// and ask for the send decision. With no pending item this is a
    /// stale interaction — reported, no state change.
    async fn on_tone_chosen(&self, tone: Tone) {
        let mut inner = self.inner.lock().await;

        let Some(item) = inner.pending.clone() else {
            warn!(tone = %tone, "Tone chosen with no pending item");
            drop(inner);
            self.send_status("⚠️ That email is no longer pending — nothing to draft.")
                .await;
            return;
        };

        let generated = match tokio::time::timeout(
            self.call_timeout,
            self.drafts.generate(tone, &item),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DraftError::Timeout(self.call_timeout)),
        };

        // Failure leaves the item pending in AwaitingTone so the operator
        // can retry with another tone choice.
        let body = match generated {
            Ok(body) => body,
            Err(e) => {
                warn!("Draft generation failed: {e}");
                drop(inner);
                self.send_status(&format!(
                    "❌ Could not draft a {} reply: {e}\nPick a tone to try again.",
                    tone.label()
                ))
                .await;
                return;
            }
        };

        inner.draft = Some(Draft {
            tone,
            body: body.clone(),
            target_item_id: item.id.clone(),
        });

        let text = format!(
            "📝 *{} draft:*\n```\n{}\n```\nShall I send it?",
            tone.label(),
            body
        );
        self.prompt(&text, &CONFIRM_CHOICES).await;
    }

    /// The operator confirmed the send. The draft must still target the
    /// current pending item — a draft orphaned by supersession is rejected
    /// without sending. Send is attempted exactly once; success or failure,
    /// the workflow clears to idle.
    async fn on_confirmed(&self) {
        let mut inner = self.inner.lock().await;

        let (Some(item), Some(draft)) = (inner.pending.clone(), inner.draft.clone()) else {
            warn!("Confirmation with no pending draft");
            drop(inner);
            self.send_status("⚠️ Nothing to send — that confirmation is no longer valid.")
                .await;
            return;
        };

        if draft.target_item_id != item.id {
            warn!(
                draft_target = %draft.target_item_id,
                pending = %item.id,
                "Stale draft rejected at confirmation"
            );
            drop(inner);
            self.send_status(
                "⚠️ A newer email replaced the one this draft answers. Not sending.",
            )
            .await;
            return;
        }

        let sent = match tokio::time::timeout(
            self.call_timeout,
            self.mail.send_reply(&item, &draft.body),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(MailError::Timeout(self.call_timeout)),
        };

        // One attempt only: even a failed send clears the workflow, so a
        // blind retry can never double-send.
        inner.pending = None;
        inner.draft = None;
        drop(inner);

        match sent {
            Ok(()) => {
                info!(item = %item.id, "Reply sent");
                self.send_status("✅ Email sent successfully.").await;
            }
            Err(e) => {
                warn!(item = %item.id, "Send failed: {e}");
                self.send_status(&format!("❌ Failed to send email: {e}"))
                    .await;
            }
        }
    }

    /// The operator cancelled (or ignored the item). Pending item and
    /// draft are discarded.
    async fn on_cancelled(&self) {
        let mut inner = self.inner.lock().await;

        if inner.pending.is_none() && inner.draft.is_none() {
            drop(inner);
            self.send_status("⚠️ Nothing pending to cancel.").await;
            return;
        }

        inner.pending = None;
        inner.draft = None;
        drop(inner);

        self.send_status("❌ Email sending cancelled.").await;
    }

    async fn prompt(&self, text: &str, choices: &[crate::notify::Choice]) {
        let result = match tokio::time::timeout(
            self.call_timeout,
            self.notifier.prompt(text, choices),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(NotifyError::Timeout(self.call_timeout)),
        };
        if let Err(e) = result {
            warn!("Failed to deliver prompt: {e}");
        }
    }

    async fn send_status(&self, text: &str) {
        let result =
            match tokio::time::timeout(self.call_timeout, self.notifier.notify(text)).await {
                Ok(r) => r,
                Err(_) => Err(NotifyError::Timeout(self.call_timeout)),
            };
        if let Err(e) = result {
            warn!("Failed to deliver status: {e}");
        }
    }
}
