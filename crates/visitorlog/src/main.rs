//! `vislog` - CLI for visitorlog
//!
//! This binary serves the visitor API, captures records from the command line
//! and reads the log back.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::error;

use visitorlog::cli::{
    CaptureCommand, Cli, ClearCommand, Command, ConfigCommand, ListCommand, LocateCommand,
    ServeCommand,
};
use visitorlog::recorder::{Position, Recorder};
use visitorlog::viewer::{table_row, Summary, Viewer, TABLE_HEADERS};
use visitorlog::{init_logging, server, Config, Reason, Record, StoreResolver};

/// Page the viewer resolves the API against.
const VIEWER_PAGE: &str = "/";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Serve(cmd) => handle_serve(config, cmd).await,
        Command::Capture(cmd) => handle_capture(&config, cmd).await,
        Command::Locate(cmd) => handle_locate(&config, cmd).await,
        Command::List(cmd) => handle_list(&config, &cmd).await,
        Command::Stats(cmd) => handle_stats(&config, cmd.json).await,
        Command::Export(cmd) => {
            let viewer = load_viewer(&config).await?;
            let path = viewer.export_to(&cmd.dir, Utc::now())?;
            println!("Exported {} records to {}", viewer.records().len(), path.display());
            Ok(())
        }
        Command::Clear(cmd) => handle_clear(&config, cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_serve(mut config: Config, cmd: ServeCommand) -> Result<()> {
    if let Some(host) = cmd.host {
        config.server.host = host;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    if cmd.static_dir.is_some() {
        config.server.static_dir = cmd.static_dir;
    }
    config.validate()?;
    server::serve(&config).await?;
    Ok(())
}

async fn handle_capture(config: &Config, cmd: CaptureCommand) -> Result<()> {
    let mut recorder = Recorder::from_config(config, cmd.client.environment())?;
    let record = recorder.capture(Reason::from(cmd.reason.as_str())).await?;
    recorder.flush().await;
    print_record(&record)
}

async fn handle_locate(config: &Config, cmd: LocateCommand) -> Result<()> {
    let mut recorder = Recorder::from_config(config, cmd.client.environment())?;
    let (Some(latitude), Some(longitude), false) = (cmd.lat, cmd.lon, cmd.denied) else {
        println!("{}", recorder.geolocation_failed());
        return Ok(());
    };

    recorder.refresh_lookups().await;
    let (status, record) = recorder.apply_precise_position(Position {
        latitude,
        longitude,
        accuracy_m: cmd.accuracy,
    })?;
    recorder.flush().await;
    println!("{status}");
    print_record(&record)
}

async fn handle_list(config: &Config, cmd: &ListCommand) -> Result<()> {
    let viewer = load_viewer(config).await?;
    let query = cmd.query.as_deref().unwrap_or("");
    let matches = viewer.search(query);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    println!("{}", viewer.source_label());
    print_summary(&viewer.summary());
    println!();

    if let Some(empty) = viewer.empty_state(query) {
        println!("{empty}");
        return Ok(());
    }
    print_table(&matches);
    Ok(())
}

async fn handle_stats(config: &Config, json: bool) -> Result<()> {
    let viewer = load_viewer(config).await?;
    let summary = viewer.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", viewer.source_label());
        print_summary(&summary);
    }
    Ok(())
}

async fn handle_clear(config: &Config, cmd: ClearCommand) -> Result<()> {
    let mut viewer = load_viewer(config).await?;
    if !cmd.yes && !confirm(viewer.clear_prompt())? {
        println!("Aborted.");
        return Ok(());
    }

    viewer.clear().await?;
    println!("Visitor log cleared.");
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Max records:        {}", config.storage.max_records);
                println!("  Cache dir:          {}", config.cache_dir().display());
                println!("  Cache key:          {}", config.storage.cache_key);
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.bind_addr());
                println!("  Max list limit:     {}", config.server.max_list_limit);
                println!("  Max body bytes:     {}", config.server.max_body_bytes);
                println!(
                    "  Static dir:         {}",
                    config
                        .server
                        .static_dir
                        .as_ref()
                        .map_or_else(|| "(none)".to_string(), |d| d.display().to_string())
                );
                println!();
                println!("[Client]");
                println!(
                    "  Base URL:           {}",
                    config.client.base_url.as_deref().unwrap_or("(none, cache only)")
                );
                println!("  Site marker:        {}", config.client.site_marker);
                println!("  Request timeout:    {:?}", config.request_timeout());
                println!();
                println!("[Recorder]");
                println!("  IP lookup:          {}", config.recorder.ip_lookup_url);
                println!("  Geo lookup:         {}", config.recorder.geo_lookup_url);
                println!("  Lookup timeout:     {:?}", config.lookup_timeout());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

async fn load_viewer(config: &Config) -> Result<Viewer> {
    let resolver = StoreResolver::from_config(config, VIEWER_PAGE)?;
    Ok(Viewer::load(resolver).await)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_record(record: &Record) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

fn print_summary(summary: &Summary) {
    println!("Records:              {}", summary.total);
    println!("Unique IPs:           {}", summary.unique_ips);
    println!("Unique fingerprints:  {}", summary.unique_fingerprints);
    println!(
        "Last seen:            {}",
        summary
            .latest
            .as_deref()
            .map_or_else(|| "none".to_string(), visitorlog::viewer::display_time)
    );
}

fn print_table(records: &[&Record]) {
    let rows: Vec<[String; 16]> = records.iter().map(|r| table_row(r)).collect();
    let mut widths = TABLE_HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", line(TABLE_HEADERS.as_slice()).trim_end());
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        println!("{}", line(&cells).trim_end());
    }
}
