//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Configuration rejected by the core's validation
    Config(String),
    /// Quota admission would currently be rejected
    QuotaRejected(String),
    /// Failed to reach or parse the outage feed
    FeedProbe(String),
    /// Failed to serialize output
    Output(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::FeedProbe(_) = self {
            eprintln!();
            eprintln!("Check that:");
            eprintln!("  1. The feed base URL is reachable from this host");
            eprintln!("  2. The API token is valid and not rate-limited");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            CliError::QuotaRejected(msg) => write!(f, "Quota admission rejected: {}", msg),
            CliError::FeedProbe(msg) => write!(f, "Outage feed probe failed: {}", msg),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}
