//! Configuration validation CLI command.

use crate::error::CliError;
use clap::Args;
use shelfstream::config::CoreSettings;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Monthly quota cap
    #[arg(long)]
    pub monthly_quota: Option<u64>,

    /// Daily quota cap
    #[arg(long)]
    pub daily_quota: Option<u64>,

    /// Emergency breaker threshold (0.0-1.0)
    #[arg(long)]
    pub emergency_threshold: Option<f64>,

    /// Warning threshold (0.0-1.0)
    #[arg(long)]
    pub warning_threshold: Option<f64>,

    /// Maximum concurrent sessions
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Worker pool concurrency
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Failure-detector threshold
    #[arg(long)]
    pub failure_threshold: Option<usize>,

    /// Failure-detector window size
    #[arg(long)]
    pub window_size: Option<usize>,
}

/// Run the validate-config command: apply overrides to the defaults and
/// check the cross-field invariants.
pub fn run(args: ConfigArgs) -> Result<(), CliError> {
    let mut settings = CoreSettings::default();
    if let Some(v) = args.monthly_quota {
        settings.quota.monthly_quota = v;
    }
    if let Some(v) = args.daily_quota {
        settings.quota.daily_quota = v;
    }
    if let Some(v) = args.emergency_threshold {
        settings.quota.emergency_threshold = v;
    }
    if let Some(v) = args.warning_threshold {
        settings.quota.warning_threshold = v;
    }
    if let Some(v) = args.max_sessions {
        settings.session.max_sessions = v;
    }
    if let Some(v) = args.concurrency {
        settings.scheduler.concurrency = v;
    }
    if let Some(v) = args.failure_threshold {
        settings.outage.failure_threshold = v;
    }
    if let Some(v) = args.window_size {
        settings.outage.window_size = v;
    }

    settings
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;

    println!("Configuration is valid");
    println!(
        "  Quota:     {}/month, {}/day, breaker at {:.0}%",
        settings.quota.monthly_quota,
        settings.quota.daily_quota,
        settings.quota.emergency_threshold * 100.0
    );
    println!(
        "  Sessions:  {} max, {} requests each, {}s lifetime",
        settings.session.max_sessions,
        settings.session.max_requests_per_session,
        settings.session.max_lifetime.as_secs()
    );
    println!(
        "  Detector:  {} failures in window of {}",
        settings.outage.failure_threshold, settings.outage.window_size
    );
    println!(
        "  Scheduler: {} workers, {}s outage pause",
        settings.scheduler.concurrency,
        settings.scheduler.outage_pause.as_secs()
    );
    Ok(())
}
