//! Inbox item and watch cursor types.

use chrono::Utc;

/// Placeholder subject used when a message carries no Subject header.
pub const NO_SUBJECT: &str = "(No Subject)";

/// One mailbox message surfaced to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxItem {
    /// Provider-assigned message id.
    pub id: String,
    /// Opaque thread id, used to reply in-thread when present.
    pub thread_id: Option<String>,
    /// Raw From header — either `addr` or `Name <addr>`.
    pub sender: String,
    /// Subject header, or [`NO_SUBJECT`] when absent.
    pub subject: String,
    /// Truncated body preview from the provider.
    pub snippet: String,
}

impl InboxItem {
    /// Bare address to reply to, extracted from the From header.
    pub fn reply_address(&self) -> &str {
        reply_address(&self.sender)
    }

    /// Display name from the From header, when one is present.
    pub fn sender_name(&self) -> Option<&str> {
        let name = self.sender.split('<').next()?.trim().trim_matches('"');
        if name.is_empty() { None } else { Some(name) }
    }
}

/// Extract the bare address from a `Name <addr>` From header.
/// A header without angle brackets is already a bare address.
pub fn reply_address(sender: &str) -> &str {
    match (sender.find('<'), sender.rfind('>')) {
        (Some(start), Some(end)) if start < end => sender[start + 1..end].trim(),
        _ => sender.trim(),
    }
}

/// Prefix a subject with `Re: ` for a reply. Subjects that already carry
/// the prefix are left alone so threads do not accumulate `Re: Re: `.
pub fn reply_subject(subject: &str) -> String {
    let already_reply = subject
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"));
    if already_reply {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}

/// Timestamp marking watcher start. Excludes pre-existing unread mail from
/// every poll query. Set once, never rewound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WatchCursor(i64);

impl WatchCursor {
    /// Capture the current time as the watch floor.
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    /// Unix seconds, as used in the Gmail `after:` query operator.
    pub fn unix_secs(&self) -> i64 {
        self.0
    }

    #[cfg(test)]
    pub fn at(secs: i64) -> Self {
        Self(secs)
    }
}
