use std::sync::Arc;

use tokio::time::sleep;

use workflow_monitor_sync::config::{Config, load_config};
use workflow_monitor_sync::panels::{register_console_panels, register_workflow_panel};
use workflow_monitor_sync::{HttpFetcher, PollOutcome, PollScheduler, SubscriberRegistry};

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Console runtime for the workflow monitor.
//
// Responsibilities:
// - Initialize logging
// - Load configuration
// - Register the console panels
// - Poll the backend until Ctrl-C
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --------------------------------------------------------
    // Load configuration
    //
    // First CLI argument, or ./config.json. A missing file
    // falls back to a local backend on :8000.
    // --------------------------------------------------------
    let path = std::env::args().nth(1).unwrap_or_else(|| "config.json".to_string());
    let config: Config = load_config(&path)?;

    let fetcher = HttpFetcher::new(config.monitor.snapshot_url(), config.monitor.timeout())?;
    let registry = Arc::new(SubscriberRegistry::new());
    register_console_panels(&registry);

    let scheduler = PollScheduler::new(Arc::new(fetcher), registry.clone());
    scheduler.set_verbose(config.debug_log());

    // --------------------------------------------------------
    // Initial poll
    //
    // Workflow detail panels are registered for every workflow
    // the backend already knows about. A failed first poll is
    // not fatal; the panels fill in once the backend answers.
    // --------------------------------------------------------
    match scheduler.poll_once().await {
        PollOutcome::Dispatched { changes, .. } => {
            for id in &changes.workflows_added {
                log::info!("registering panel for workflow {id}");
                register_workflow_panel(&registry, id);
            }
        }
        PollOutcome::Failed(e) => log::warn!("initial poll failed: {e}"),
        PollOutcome::Skipped | PollOutcome::Discarded => {}
    }

    // --------------------------------------------------------
    // Metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    let metrics = scheduler.metrics();
    let every = config.metrics_interval();
    let reporter = tokio::spawn(async move {
        loop {
            sleep(every).await;
            log::info!("{}", metrics.report_line());
        }
    });

    scheduler.start(config.monitor.interval());

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    scheduler.stop();
    reporter.abort();

    Ok(())
}
