use std::sync::Arc;
use std::sync::atomic::Ordering;

use inbox_pilot::config::{Config, Ingestion};
use inbox_pilot::draft::{DraftGenerator, OpenAiDraftGenerator};
use inbox_pilot::gmail::{GmailAuth, GmailClient, MailProvider, WatchCursor};
use inbox_pilot::notify::{Notifier, TelegramNotifier, dispatch_update};
use inbox_pilot::poller::spawn_mail_poller;
use inbox_pilot::server::{AppState, webhook_routes};
use inbox_pilot::workflow::Workflow;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, OPENAI_API_KEY");
        std::process::exit(1);
    });

    eprintln!("📬 Inbox Pilot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.openai_model);
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());
    eprintln!("   Signer: {}", config.signer_name);
    match config.ingestion {
        Ingestion::LongPoll => eprintln!("   Updates: long-poll"),
        Ingestion::Webhook { port } => {
            eprintln!("   Updates: webhook on http://0.0.0.0:{port}/webhook")
        }
    }

    // Mail calls get a hard client-side timeout; the Telegram client stays
    // unbounded because getUpdates long-polls for 30s by design.
    let mail_http = reqwest::Client::builder()
        .timeout(config.call_timeout)
        .build()?;
    let http = reqwest::Client::new();

    let auth = GmailAuth::bootstrap(
        &config.credentials_path,
        config.credentials_base64.as_deref(),
        &config.token_path,
        mail_http.clone(),
    )
    .await
    .unwrap_or_else(|e| {
        eprintln!("Error: Gmail bootstrap failed: {e}");
        std::process::exit(1);
    });

    let mail: Arc<dyn MailProvider> = Arc::new(GmailClient::new(Arc::new(auth), mail_http));
    let drafts: Arc<dyn DraftGenerator> = Arc::new(OpenAiDraftGenerator::new(
        http.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.signer_name.clone(),
    ));
    let telegram = Arc::new(TelegramNotifier::new(
        config.bot_token.clone(),
        config.operator_chat_id,
        http.clone(),
    ));

    let workflow = Arc::new(Workflow::new(
        Arc::clone(&mail),
        drafts,
        Arc::clone(&telegram) as Arc<dyn Notifier>,
        config.call_timeout,
    ));

    // Only mail arriving after startup is surfaced.
    let cursor = WatchCursor::now();
    let (poller_handle, poller_shutdown) =
        spawn_mail_poller(mail, Arc::clone(&workflow), cursor, config.poll_interval);

    match config.ingestion {
        Ingestion::Webhook { port } => {
            let app = webhook_routes(AppState {
                notifier: Arc::clone(&telegram) as Arc<dyn Notifier>,
                workflow: Arc::clone(&workflow),
                operator_chat_id: config.operator_chat_id,
            });
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
            tracing::info!(port, "Webhook server started");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Ingestion::LongPoll => {
            let mut updates = telegram.spawn_update_listener();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    maybe = updates.recv() => match maybe {
                        Some(update) => {
                            dispatch_update(update, telegram.as_ref(), &workflow).await;
                        }
                        None => break,
                    },
                }
            }
        }
    }

    tracing::info!("Shutting down");
    poller_shutdown.store(true, Ordering::Relaxed);
    let grace = config.poll_interval + std::time::Duration::from_secs(1);
    if tokio::time::timeout(grace, poller_handle).await.is_err() {
        tracing::warn!("Mail poller did not stop within the grace period");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
    }
}
