use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{legacy_http::LegacyHttpClient, DashboardClient, SessionOptions};
use shared::domain::CommandId;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod console;

use config::{load_settings, parse_chip_ids, Settings, DEFAULT_CONFIG_FILE};

#[derive(Parser, Debug)]
#[command(name = "larpix-dashboard", about = "Monitor and control a LArPix DAQ rig")]
struct Args {
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Push channel url (ws://, wss://, http:// or https://).
    #[arg(long)]
    ws_url: Option<String>,
    /// Base url of the webapp's HTTP command surface.
    #[arg(long)]
    http_url: Option<String>,
    /// Comma separated chip ids.
    #[arg(long)]
    chips: Option<String>,
    /// Seconds before an unanswered command is reported stale; 0 disables.
    #[arg(long)]
    command_timeout_secs: Option<u64>,
    #[arg(long)]
    log_filter: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive console over the push channel.
    Console,
    StartRun,
    EndRun,
    /// Fetch the recorded result of an action.
    Action { id: u64 },
    /// Keep the webapp draining its DAQ inbox.
    Poll {
        #[arg(long)]
        interval_ms: Option<u64>,
    },
}

fn resolve_settings(args: &Args) -> Result<Settings> {
    let mut settings = load_settings(&args.config);
    if let Some(v) = &args.ws_url {
        settings.ws_url = v.clone();
    }
    if let Some(v) = &args.http_url {
        settings.http_url = v.clone();
    }
    if let Some(v) = &args.chips {
        settings.chip_ids = parse_chip_ids(v)?;
    }
    if let Some(secs) = args.command_timeout_secs {
        settings.command_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(v) = &args.log_filter {
        settings.log_filter = v.clone();
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = resolve_settings(&args)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Console => {
            let options = SessionOptions {
                command_timeout: settings.command_timeout,
                ..SessionOptions::default()
            };
            let client =
                DashboardClient::connect(&settings.ws_url, &settings.chip_ids, options).await?;
            console::run(client, &settings.chip_ids).await?;
        }
        Command::StartRun => {
            let reply = legacy_client(&settings)?.start_run().await?;
            println!("{reply}");
        }
        Command::EndRun => {
            let reply = legacy_client(&settings)?.end_run().await?;
            println!("{reply}");
        }
        Command::Action { id } => {
            let result = legacy_client(&settings)?
                .action_result(CommandId(id))
                .await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Poll { interval_ms } => {
            let interval = interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(settings.poll_interval);
            let client = Arc::new(legacy_client(&settings)?);
            let poller = client.spawn_process_poller(interval);
            info!(?interval, url = %settings.http_url, "polling webapp; ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            poller.abort();
        }
    }
    Ok(())
}

fn legacy_client(settings: &Settings) -> Result<LegacyHttpClient> {
    LegacyHttpClient::new(&settings.http_url)
        .with_context(|| format!("bad http url {}", settings.http_url))
}
