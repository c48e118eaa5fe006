//! Quota inspection CLI command.

use crate::error::CliError;
use clap::Args;
use shelfstream::config::QuotaSettings;
use shelfstream::quota::QuotaTracker;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct QuotaArgs {
    /// Path to the persisted quota snapshot
    #[arg(long)]
    pub quota_file: Option<PathBuf>,

    /// Override the monthly quota cap
    #[arg(long)]
    pub monthly_quota: Option<u64>,

    /// Override the daily quota cap
    #[arg(long)]
    pub daily_quota: Option<u64>,
}

/// Run the check-quota command. Exits non-zero when a request would
/// currently be rejected, so the command is usable as a scripted gate.
pub fn run(args: QuotaArgs) -> Result<(), CliError> {
    let mut settings = QuotaSettings {
        persist_path: args.quota_file,
        ..Default::default()
    };
    if let Some(cap) = args.monthly_quota {
        settings.monthly_quota = cap;
    }
    if let Some(cap) = args.daily_quota {
        settings.daily_quota = cap;
    }

    let tracker = QuotaTracker::new(settings);
    let status = tracker.status();

    println!(
        "Monthly: {}/{} ({:.1}%)",
        status.monthly_used, status.monthly_cap, status.monthly_pct
    );
    println!(
        "Daily:   {}/{} ({:.1}%)",
        status.daily_used, status.daily_cap, status.daily_pct
    );
    println!(
        "Budget:  {:.0} requests/day over {} remaining days",
        status.daily_budget, status.days_remaining
    );

    if tracker.check_admission() {
        println!("Admission: allowed");
        Ok(())
    } else if status.breaker_tripped {
        Err(CliError::QuotaRejected(
            "circuit breaker is tripped".to_string(),
        ))
    } else {
        Err(CliError::QuotaRejected(
            "a quota cap has been reached".to_string(),
        ))
    }
}
