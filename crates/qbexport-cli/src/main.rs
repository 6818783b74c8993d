use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use qbexport_core::{capture_timestamp, ExporterConfig, QbitClient, ScrapeMode, SnapshotBuilder, TorrentClient};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter};

mod exporter;
mod signals;

#[derive(Debug, Parser)]
#[command(name = "qbittorrent-exporter")]
#[command(about = "Line-protocol metrics exporter for qBittorrent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long, value_enum, default_value = "compact")]
    log_format: LogFormat,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve scrapes over HTTP until signalled.
    Serve,
    /// Print one snapshot to stdout and exit.
    Once {
        #[arg(long, value_enum, default_value = "active")]
        mode: Mode,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    Active,
    Inactive,
    Legacy,
}

impl From<Mode> for ScrapeMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Active => ScrapeMode::Active,
            Mode::Inactive => ScrapeMode::Inactive,
            Mode::Legacy => ScrapeMode::Legacy,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log at info until the configured level is known.
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new("info"));
    let json = matches!(cli.log_format, LogFormat::Json);
    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().with_target(false).compact()))
        .init();

    let config = match ExporterConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let configured = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level));
    match configured {
        Ok(level) => filter_handle.reload(level)?,
        Err(err) => error!(level = %config.log_level, error = %err, "ignoring invalid log level"),
    }

    let client: Arc<dyn TorrentClient> = Arc::new(QbitClient::new(&config).context("failed to build http client")?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                remote = %config.base_url(),
                port = config.exporter_port,
                log_peers = config.log_peers,
                log_inactive_peers = config.log_inactive_peers,
                "exporter is starting up"
            );
            let handler = Arc::new(exporter::ScrapeHandler::new(client, config.snapshot_options()));
            exporter::run_exporter(handler, config.exporter_port, signals::shutdown_signal()).await?;
        }
        Command::Once { mode } => {
            let options = config.snapshot_options();
            let collection = SnapshotBuilder::new(client.as_ref(), &options, capture_timestamp())
                .build(mode.into())
                .await?;
            print!("{collection}");
        }
    }

    Ok(())
}
