//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory served for non-API paths
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,
}

/// Client attributes shared by `capture` and `locate`.
#[derive(Debug, Clone, Default, Args)]
pub struct ClientArgs {
    /// Page path being visited
    #[arg(long, default_value = "/")]
    pub page: String,

    /// Referring URL
    #[arg(long)]
    pub referrer: Option<String>,

    /// User-agent string (defaults to this tool's own)
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Preferred languages, most preferred first
    #[arg(long, value_delimiter = ',')]
    pub languages: Vec<String>,

    /// IANA timezone name
    #[arg(long)]
    pub timezone: Option<String>,

    /// Window size as WxH
    #[arg(long, value_parser = parse_size)]
    pub viewport: Option<(u32, u32)>,

    /// Screen size as WxH
    #[arg(long, value_parser = parse_size)]
    pub screen: Option<(u32, u32)>,

    /// Device pixel ratio
    #[arg(long)]
    pub pixel_ratio: Option<f64>,

    /// Maximum touch points
    #[arg(long, default_value_t = 0)]
    pub touch_points: u32,

    /// Approximate device memory in GB
    #[arg(long)]
    pub device_memory: Option<f64>,

    /// Report the client as offline
    #[arg(long)]
    pub offline: bool,

    /// Effective connection type, e.g. 4g
    #[arg(long)]
    pub connection: Option<String>,

    /// Downlink estimate in Mbps
    #[arg(long)]
    pub downlink: Option<f64>,
}

/// Capture command arguments.
#[derive(Debug, Args)]
pub struct CaptureCommand {
    /// Why the record is captured
    #[arg(short, long, default_value = "initial-load")]
    pub reason: String,

    /// Client attributes
    #[command(flatten)]
    pub client: ClientArgs,
}

/// Locate command arguments.
#[derive(Debug, Args)]
pub struct LocateCommand {
    /// Latitude in degrees
    #[arg(long, allow_hyphen_values = true, required_unless_present = "denied")]
    pub lat: Option<f64>,

    /// Longitude in degrees
    #[arg(long, allow_hyphen_values = true, required_unless_present = "denied")]
    pub lon: Option<f64>,

    /// Accuracy radius in meters
    #[arg(long, default_value_t = 0.0)]
    pub accuracy: f64,

    /// The position request was denied or timed out
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    pub denied: bool,

    /// Client attributes
    #[command(flatten)]
    pub client: ClientArgs,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Case-insensitive search across all fields
    pub query: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Stats command arguments.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Directory to write the export into
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,
}

/// Clear command arguments.
#[derive(Debug, Args)]
pub struct ClearCommand {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {value:?}"))?;
    let w = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let h = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size("390X844"), Ok((390, 844)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("axb").is_err());
    }

    #[test]
    fn test_client_args_default() {
        let args = ClientArgs::default();
        assert!(args.languages.is_empty());
        assert!(!args.offline);
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
