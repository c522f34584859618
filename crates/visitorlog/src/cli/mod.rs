//! Command-line interface for visitorlog.
//!
//! This module provides the CLI structure for the `vislog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::recorder::{ClientEnvironment, ConnectionInfo};

pub use commands::{
    CaptureCommand, ClearCommand, ClientArgs, ConfigCommand, ExportCommand, ListCommand,
    LocateCommand, ServeCommand, StatsCommand,
};

/// vislog - Record and review page visitors
///
/// Serves the visitor API, captures visitor records and reads the log back
/// from the server or the local cache.
#[derive(Debug, Parser)]
#[command(name = "vislog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the visitor HTTP API
    Serve(ServeCommand),

    /// Capture one visitor record
    Capture(CaptureCommand),

    /// Apply a precise position and capture a record
    Locate(LocateCommand),

    /// List and search visitor records
    List(ListCommand),

    /// Show summary statistics
    Stats(StatsCommand),

    /// Export all visitor records as JSON
    Export(ExportCommand),

    /// Delete all visitor records
    Clear(ClearCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

impl ClientArgs {
    /// The client environment described by these flags.
    ///
    /// Anything not given falls back to what [`ClientEnvironment::detect`] sees.
    #[must_use]
    pub fn environment(&self) -> ClientEnvironment {
        let mut env = ClientEnvironment::detect();
        env.page.clone_from(&self.page);
        if let Some(referrer) = &self.referrer {
            env.referrer.clone_from(referrer);
        }
        if let Some(user_agent) = &self.user_agent {
            env.user_agent.clone_from(user_agent);
        }
        if !self.languages.is_empty() {
            env.languages.clone_from(&self.languages);
        }
        if self.timezone.is_some() {
            env.timezone.clone_from(&self.timezone);
        }
        env.viewport = self.viewport.or(env.viewport);
        env.screen = self.screen.or(env.screen);
        env.device_pixel_ratio = self.pixel_ratio.or(env.device_pixel_ratio);
        env.max_touch_points = self.touch_points;
        env.device_memory_gb = self.device_memory.or(env.device_memory_gb);
        env.online = !self.offline;
        if self.connection.is_some() || self.downlink.is_some() {
            env.connection = Some(ConnectionInfo {
                effective_type: self.connection.clone(),
                downlink_mbps: self.downlink,
            });
        }
        env
    }
}
