//! CLI module for toolpilot - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for serving the gateway,
//! listing tools, and running tasks.

pub mod commands;

pub use commands::Cli;
