//! CLI module for genloop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running the
//! generation loop, inspecting the catalog and reading usage counts.

pub mod commands;

pub use commands::Cli;
