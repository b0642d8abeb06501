//! Command-line interface definition for junban.
//!
//! This module defines the CLI structure using clap derive macros,
//! including all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::LogLevel;

/// junban - Dependency-ordered service startup with readiness gating
///
/// Starts the services of a deployment in dependency order and only moves on
/// to a service's dependents once its readiness check passes.
#[derive(Debug, Parser)]
#[command(name = "junban")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "JUNBAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level requested by the verbose/quiet flags, if any.
    ///
    /// `None` leaves the level to the configuration file.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.quiet {
            return Some(LogLevel::Error);
        }

        match self.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    }

    /// Resolves the configuration path: a positional path wins over
    /// `--config` / `JUNBAN_CONFIG`.
    pub fn config_path<'a>(&'a self, positional: Option<&'a Path>) -> Option<&'a Path> {
        positional.or(self.config.as_deref())
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start every service in dependency order and wait for readiness
    Run(RunArgs),

    /// Print the startup layers without starting anything
    Plan(PlanArgs),

    /// Configuration file operations
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Configuration file
    #[arg(value_name = "CONFIG")]
    pub file: Option<PathBuf>,

    /// Print the report as JSON instead of status lines
    #[arg(long)]
    pub json: bool,

    /// Environment variant to deploy
    #[arg(long)]
    pub variant: Option<String>,
}

/// Arguments for the `plan` subcommand.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Configuration file
    #[arg(value_name = "CONFIG")]
    pub file: Option<PathBuf>,
}

/// Configuration subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Validate the configuration file and its service graph
    Validate,

    /// Show the effective configuration
    Show,
}
