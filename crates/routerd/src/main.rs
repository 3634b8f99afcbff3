//! routerd - router relation reconciler daemon
//!
//! Consumes relation lifecycle events and keeps the router's interfaces
//! and routes in line with what requirer units publish.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use routerd::daemon::{self, OutputFormat, ReconcileOptions};
use routerd::tables::DEFAULT_CONFIG_PATH;
use routerd::RouterdConfig;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Router relation reconciler
#[derive(Parser, Debug)]
#[command(name = "routerd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply relation events (one JSON object per line) to the router
    Reconcile {
        /// Event file; reads stdin when omitted
        #[arg(short = 'e', long)]
        events: Option<PathBuf>,

        /// Configuration file
        #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Print the commands instead of running them
        #[arg(long)]
        dry_run: bool,

        /// Skip forwarding and masquerade setup
        #[arg(long)]
        skip_prepare: bool,

        /// Tear down every interface and route once all events are handled
        #[arg(long)]
        teardown_on_exit: bool,
    },

    /// Print the relation data a requirer unit would publish
    Publish {
        /// Interface name
        #[arg(long)]
        name: String,

        /// Gateway address with prefix length, e.g. 192.168.250.1/24
        #[arg(long)]
        gateway: String,

        /// Route as <network>=<gateway>; may be repeated
        #[arg(long = "route")]
        routes: Vec<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Flat)]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let result = match args.command {
        Command::Reconcile {
            events,
            config,
            dry_run,
            skip_prepare,
            teardown_on_exit,
        } => {
            let opts = ReconcileOptions {
                dry_run,
                skip_prepare,
                teardown_on_exit,
            };
            reconcile(events, config, opts, args.log_level).await
        }
        Command::Publish {
            name,
            gateway,
            routes,
            format,
        } => daemon::publish_output(&name, &gateway, &routes, format)
            .map(|output| {
                println!("{}", output);
                ExitCode::SUCCESS
            })
            .map_err(Into::into),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("routerd failed: {:#}", e);
            eprintln!("routerd: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn reconcile(
    events: Option<PathBuf>,
    config_path: PathBuf,
    opts: ReconcileOptions,
    log_level: Option<String>,
) -> Result<ExitCode> {
    let config = RouterdConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;

    init_logging(log_level.as_deref().unwrap_or(&config.logging.level));

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let summary = daemon::reconcile(&config, &opts, reader, &mut std::io::stdout())
        .await
        .context("reconciling relation events")?;
    Ok(ExitCode::from(summary.exit_code()))
}
