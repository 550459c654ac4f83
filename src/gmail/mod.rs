//! Gmail integration — REST client, OAuth handling, and inbox item types.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::GmailAuth;
pub use client::GmailClient;
pub use types::{InboxItem, WatchCursor};

use async_trait::async_trait;

use crate::error::MailError;

/// Mailbox operations the poller and workflow need from the provider.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Fetch the single newest unread INBOX message that arrived after the
    /// watch cursor, or `None` when the inbox is quiet.
    async fn fetch_latest_unread(
        &self,
        cursor: WatchCursor,
    ) -> Result<Option<InboxItem>, MailError>;

    /// Mark a message read at the provider. Idempotent — re-marking an
    /// already-read message is a no-op, never an error.
    async fn mark_read(&self, message_id: &str) -> Result<(), MailError>;

    /// Send a reply to the item's sender, in-thread when a thread id is
    /// available.
    async fn send_reply(&self, item: &InboxItem, body: &str) -> Result<(), MailError>;
}
