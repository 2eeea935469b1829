//! Subcommand implementations.

pub mod basket;
pub mod catalog;
mod output;

/// Result type shared by all commands.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;
