use std::sync::Arc;
use std::sync::atomic::Ordering;

use leadflow::config::PipelineConfig;
use leadflow::model::MessageStatus;
use leadflow::pipeline::{Action, DecisionEngine, Reviewer};
use leadflow::queue::{DeliveryQueue, Dispatcher};
use leadflow::report::PipelineReport;
use leadflow::sender::{Sender, SmtpConfig, SmtpSender, StorageSender};
use leadflow::store::{LibSqlBackend, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PipelineConfig::from_env()?;

    eprintln!("Leadflow v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.database_path.display());
    eprintln!(
        "   Mode: {}",
        if config.dry_run { "dry run" } else { "live" }
    );
    eprintln!(
        "   Rate: {}/min, batch: {}, retries: {}",
        config.max_per_minute, config.batch_size, config.max_retries
    );

    let store: Arc<dyn Store> = Arc::new(LibSqlBackend::new_local(&config.database_path).await?);

    // Live email needs SMTP config; everything else goes through storage.
    let sender: Arc<dyn Sender> = if config.dry_run {
        Arc::new(StorageSender::new(&config.storage_dir))
    } else if let Some(smtp) = SmtpConfig::from_env() {
        Arc::new(SmtpSender::new(smtp, &config.storage_dir))
    } else {
        tracing::warn!("No SMTP configuration found, falling back to storage sender");
        Arc::new(StorageSender::new(&config.storage_dir))
    };

    let engine = DecisionEngine::new(&config);
    let reviewer = Reviewer::new(Arc::clone(&store));
    let dispatcher = Dispatcher::new(Arc::clone(&store), sender, &config);
    let mut queue = DeliveryQueue::new(Arc::clone(&store), config.batch_size);

    // ctrl-c trips the dispatcher's shutdown flag; the loop stops at the
    // next item boundary.
    let shutdown = dispatcher.shutdown_flag();
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping after current item");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    tracing::info!(
        min_confidence = config.min_confidence_score,
        "Upstream message-generation eligibility threshold"
    );

    // Decision-driven cycle: ask the state machine what each lead needs,
    // run the operations this binary owns, repeat while progress is made.
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let items = store.decision_batch(config.batch_size).await?;
        let (actionable, halted): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|i| engine.should_proceed(i.lead_status, i.message_status, 0));
        if !halted.is_empty() {
            tracing::debug!(count = halted.len(), "Entities at a halt state, skipped");
        }

        let groups = engine.batch_decide(&actionable);
        let mut progressed = false;

        for group in &groups {
            match &group.decision.action {
                Action::Review { auto_approve } => {
                    let outcome = reviewer.review_pending(*auto_approve).await?;
                    tracing::info!(
                        reviewed = outcome.reviewed,
                        approved = outcome.approved,
                        rejected = outcome.rejected,
                        "Review pass"
                    );
                    progressed |= outcome.reviewed > 0;
                }
                Action::Send { .. } => {
                    let fetched = queue.fetch_batch(MessageStatus::Approved, None).await?;
                    if fetched > 0 {
                        let outcome = dispatcher.process(&mut queue, config.dry_run).await;
                        tracing::info!(
                            sent = outcome.sent,
                            failed = outcome.failed,
                            achieved_rate = outcome.achieved_rate,
                            "Dispatch pass"
                        );
                        progressed |= outcome.sent + outcome.failed > 0;
                    }
                }
                Action::Retry { .. } => {
                    let fetched = queue.fetch_batch(MessageStatus::Failed, None).await?;
                    if fetched > 0 {
                        let outcome = dispatcher.process(&mut queue, config.dry_run).await;
                        tracing::info!(
                            sent = outcome.sent,
                            failed = outcome.failed,
                            "Retry pass"
                        );
                        progressed |= outcome.sent + outcome.failed > 0;
                    }
                }
                Action::Error { status } => {
                    tracing::warn!(
                        status = %status,
                        count = group.items.len(),
                        "Leads with status outside decision tables"
                    );
                }
                other => {
                    tracing::debug!(
                        action = other.label(),
                        count = group.items.len(),
                        "Action owned by an external collaborator, skipped"
                    );
                }
            }
        }

        // A dry run leaves statuses untouched; a second pass would redo
        // the same work, so it runs the cycle exactly once.
        if config.dry_run || !progressed {
            break;
        }
    }

    let report = PipelineReport::collect(store.as_ref(), &queue).await?;
    tracing::info!("Pipeline cycle complete: {}", report.summary());
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
