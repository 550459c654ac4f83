//! Mailbox poller — surfaces at most one new unread item per cycle.
//!
//! Runs on a fixed interval against the watch cursor captured at startup.
//! A cycle that finds an item hands it to the workflow core, then marks the
//! source message read at the provider (idempotent). Transient provider
//! errors are logged and the cycle is skipped; the poller never crashes the
//! process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::gmail::{MailProvider, WatchCursor};
use crate::workflow::Workflow;

/// Spawn the background poll loop.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling
/// after the current cycle.
pub fn spawn_mail_poller(
    mail: Arc<dyn MailProvider>,
    workflow: Arc<Workflow>,
    cursor: WatchCursor,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            "Mail poller started — polling every {}s for mail after {}",
            interval.as_secs(),
            cursor.unix_secs()
        );

        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Mail poller shutting down");
                return;
            }

            poll_once(&mail, &workflow, cursor).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run a single poll cycle: fetch newest unread → surface → mark read.
async fn poll_once(mail: &Arc<dyn MailProvider>, workflow: &Arc<Workflow>, cursor: WatchCursor) {
    let item = match mail.fetch_latest_unread(cursor).await {
        Ok(Some(item)) => item,
        Ok(None) => return,
        Err(e) => {
            // Transient failure: skip this cycle, retry on the next tick.
            error!("Mail poll failed: {e}");
            return;
        }
    };

    debug!(id = %item.id, sender = %item.sender, "Surfacing unread item");

    let item_id = item.id.clone();
    workflow.on_new_item(item).await;

    // Re-marking an already-read message is a provider-side no-op; a
    // failure here only means the item is surfaced again next cycle.
    if let Err(e) = mail.mark_read(&item_id).await {
        warn!(id = %item_id, "Failed to mark item read: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use super::*;
    use crate::draft::{DraftGenerator, Tone};
    use crate::error::{DraftError, MailError, NotifyError};
    use crate::gmail::InboxItem;
    use crate::notify::{Choice, Notifier};

    struct ScriptedMail {
        /// One entry per poll cycle.
        cycles: StdMutex<Vec<Result<Option<InboxItem>, MailError>>>,
        marked: StdMutex<Vec<String>>,
        fail_mark: bool,
    }

    impl ScriptedMail {
        fn new(cycles: Vec<Result<Option<InboxItem>, MailError>>) -> Self {
            Self {
                cycles: StdMutex::new(cycles),
                marked: StdMutex::new(Vec::new()),
                fail_mark: false,
            }
        }
    }

    #[async_trait]
    impl MailProvider for ScriptedMail {
        async fn fetch_latest_unread(
            &self,
            _cursor: WatchCursor,
        ) -> Result<Option<InboxItem>, MailError> {
            let mut cycles = self.cycles.lock().unwrap();
            if cycles.is_empty() {
                Ok(None)
            } else {
                cycles.remove(0)
            }
        }

        async fn mark_read(&self, message_id: &str) -> Result<(), MailError> {
            if self.fail_mark {
                return Err(MailError::Api {
                    endpoint: "messages.modify".into(),
                    reason: "500".into(),
                });
            }
            self.marked.lock().unwrap().push(message_id.to_string());
            Ok(())
        }

        async fn send_reply(&self, _item: &InboxItem, _body: &str) -> Result<(), MailError> {
            Ok(())
        }
    }

    struct NullDrafts;

    #[async_trait]
    impl DraftGenerator for NullDrafts {
        async fn generate(&self, _tone: Tone, _item: &InboxItem) -> Result<String, DraftError> {
            Ok("draft".into())
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn notify(&self, _text: &str) -> Result<(), NotifyError> {
            Ok(())
        }

        async fn prompt(&self, _text: &str, _choices: &[Choice]) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn item(id: &str) -> InboxItem {
        InboxItem {
            id: id.into(),
            thread_id: None,
            sender: "a@x.com".into(),
            subject: "Hi".into(),
            snippet: "...".into(),
        }
    }

    fn workflow(mail: Arc<dyn MailProvider>) -> Arc<Workflow> {
        Arc::new(Workflow::new(
            mail,
            Arc::new(NullDrafts),
            Arc::new(NullNotifier),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn poll_once_surfaces_item_and_marks_it_read() {
        let mail = Arc::new(ScriptedMail::new(vec![Ok(Some(item("m1")))]));
        let wf = workflow(Arc::clone(&mail) as Arc<dyn MailProvider>);

        poll_once(
            &(Arc::clone(&mail) as Arc<dyn MailProvider>),
            &wf,
            WatchCursor::at(0),
        )
        .await;

        assert_eq!(wf.pending_item_id().await.as_deref(), Some("m1"));
        assert_eq!(mail.marked.lock().unwrap().as_slice(), ["m1"]);
    }

    #[tokio::test]
    async fn poll_once_quiet_inbox_changes_nothing() {
        let mail = Arc::new(ScriptedMail::new(vec![Ok(None)]));
        let wf = workflow(Arc::clone(&mail) as Arc<dyn MailProvider>);

        poll_once(
            &(Arc::clone(&mail) as Arc<dyn MailProvider>),
            &wf,
            WatchCursor::at(0),
        )
        .await;

        assert_eq!(wf.pending_item_id().await, None);
        assert!(mail.marked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn poll_error_skips_cycle_then_recovers() {
        let mail = Arc::new(ScriptedMail::new(vec![
            Err(MailError::Api {
                endpoint: "messages.list".into(),
                reason: "timeout".into(),
            }),
            Ok(Some(item("m2"))),
        ]));
        let wf = workflow(Arc::clone(&mail) as Arc<dyn MailProvider>);
        let provider = Arc::clone(&mail) as Arc<dyn MailProvider>;

        // Error cycle: no state change, no panic.
        poll_once(&provider, &wf, WatchCursor::at(0)).await;
        assert_eq!(wf.pending_item_id().await, None);

        // Next cycle succeeds.
        poll_once(&provider, &wf, WatchCursor::at(0)).await;
        assert_eq!(wf.pending_item_id().await.as_deref(), Some("m2"));
    }

    #[tokio::test]
    async fn mark_read_failure_still_surfaces_item() {
        let mail = Arc::new(ScriptedMail {
            cycles: StdMutex::new(vec![Ok(Some(item("m3")))]),
            marked: StdMutex::new(Vec::new()),
            fail_mark: true,
        });
        let wf = workflow(Arc::clone(&mail) as Arc<dyn MailProvider>);

        poll_once(
            &(Arc::clone(&mail) as Arc<dyn MailProvider>),
            &wf,
            WatchCursor::at(0),
        )
        .await;

        assert_eq!(wf.pending_item_id().await.as_deref(), Some("m3"));
    }

    #[tokio::test]
    async fn shutdown_flag_stops_the_loop() {
        let mail = Arc::new(ScriptedMail::new(Vec::new()));
        let wf = workflow(Arc::clone(&mail) as Arc<dyn MailProvider>);

        let (handle, shutdown) = spawn_mail_poller(
            Arc::clone(&mail) as Arc<dyn MailProvider>,
            wf,
            WatchCursor::at(0),
            Duration::from_millis(10),
        );

        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller did not observe shutdown flag")
            .unwrap();
    }
}
