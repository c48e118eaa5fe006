//! Status snapshot CLI command.

use crate::error::CliError;
use clap::Args;
use shelfstream::config::CoreSettings;
use shelfstream::outage::{FailureDetector, GridStatusFeed, OutageFeed};
use shelfstream::quota::QuotaTracker;
use shelfstream::session::SessionPool;
use shelfstream::status::StatusSnapshot;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Path to the persisted quota snapshot
    #[arg(long)]
    pub quota_file: Option<PathBuf>,

    /// Print the full snapshot as JSON instead of a summary
    #[arg(long)]
    pub json: bool,

    /// Probe the outage feed at this base URL and fold the result in
    #[arg(long)]
    pub feed_url: Option<String>,

    /// API token for the outage feed
    #[arg(long, requires = "feed_url")]
    pub feed_token: Option<String>,
}

/// Run the status command.
pub async fn run(args: StatusArgs) -> Result<(), CliError> {
    let mut settings = CoreSettings::default();
    settings.quota.persist_path = args.quota_file;

    let quota = QuotaTracker::new(settings.quota);
    let sessions = SessionPool::new(settings.session);
    let detector = FailureDetector::new(settings.outage.clone());

    if let (Some(url), Some(token)) = (&args.feed_url, &args.feed_token) {
        let feed = GridStatusFeed::new(url, token, settings.outage.feed_poll_interval)
            .map_err(|e| CliError::FeedProbe(e.to_string()))?;
        let stage = feed
            .current_stage()
            .await
            .map_err(|e| CliError::FeedProbe(e.to_string()))?;
        detector.apply_feed_stage(stage);
        println!("Outage feed stage: {}", stage);
    }

    let snapshot = StatusSnapshot::collect(&quota, &sessions, &detector);

    if args.json {
        let json =
            serde_json::to_string_pretty(&snapshot).map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    println!("{}", snapshot.summary());
    println!();
    println!(
        "Monthly quota:  {}/{} ({:.1}%)",
        snapshot.quota.monthly_used, snapshot.quota.monthly_cap, snapshot.quota.monthly_pct
    );
    println!(
        "Daily quota:    {}/{} ({:.1}%)",
        snapshot.quota.daily_used, snapshot.quota.daily_cap, snapshot.quota.daily_pct
    );
    println!(
        "Daily budget:   {:.0} requests over {} remaining days",
        snapshot.quota.daily_budget, snapshot.quota.days_remaining
    );
    if snapshot.quota.breaker_tripped {
        println!(
            "Circuit breaker: TRIPPED since {}",
            snapshot
                .quota
                .breaker_trip_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string())
        );
    }
    println!("Network status: {}", snapshot.network_status);
    println!(
        "Failure window: {}/{} (threshold {}, {} distinct targets)",
        snapshot.failure_pattern.failures,
        snapshot.failure_pattern.window_size,
        snapshot.failure_pattern.threshold,
        snapshot.failure_pattern.distinct_targets
    );
    Ok(())
}
