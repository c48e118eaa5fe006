//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! - [`status`] - Point-in-time status snapshot of the collection stack
//! - [`quota`] - Quota usage and admission inspection
//! - [`config`] - Configuration validation

pub mod config;
pub mod quota;
pub mod status;
