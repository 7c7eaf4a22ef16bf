//! Command-line entry point: sync and auth commands
//!
//! This crate provides the `cybozu2gcal` binary.

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::{CliError, CliResult};
