//! Runs the filter once against a saved feed snapshot.
//!
//! Usage: `job-feed-filter <feed.html>`; `JOBFEED_ENV` picks `config/<env>.toml`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use job_feed_filter::host::MemoryPage;
use job_feed_filter::infrastructure::logging::log_system_info;
use job_feed_filter::infrastructure::{SettingsStore, SweepConfig, init_logging_with_config};
use job_feed_filter::{FeedDriver, LiveSettings, SweepOutcome, TracingProgressSink};

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("JOBFEED_ENV").unwrap_or_else(|_| "development".to_string());
    let config = SweepConfig::for_environment(&env).unwrap_or_else(|e| {
        eprintln!("config/{env} not usable ({e}), falling back to defaults");
        SweepConfig::default()
    });
    init_logging_with_config(&config.logging).context("failed to initialize logging")?;
    log_system_info();

    let snapshot = std::env::args()
        .nth(1)
        .context("usage: job-feed-filter <feed.html>")?;
    let html = tokio::fs::read_to_string(&snapshot)
        .await
        .with_context(|| format!("failed to read {snapshot}"))?;

    let store = SettingsStore::in_config_dir()?;
    let settings = store.load().await;
    info!("⚙️ Settings from {}: {:?}", store.path().display(), settings);

    let page = Arc::new(MemoryPage::new(html));
    let driver = FeedDriver::new(
        page,
        Arc::new(LiveSettings::new(settings)),
        Arc::new(TracingProgressSink),
        config,
    );

    let summary = driver.filter().apply_all(settings).await;
    info!(
        "✅ Filtering complete: {} hidden, {} visible",
        summary.hidden, summary.visible
    );

    match driver.trigger_sweep().await? {
        SweepOutcome::Finished(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        other => warn!("No sweep ran: {:?}", other),
    }

    store.save(settings).await?;
    Ok(())
}
