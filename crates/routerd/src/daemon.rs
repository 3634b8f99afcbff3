//! Daemon entry points behind the `routerd` command line

use std::io::Write;

use clap::ValueEnum;
use router_cfgmgr_common::{process_event, RelationEvent, RouterError, RouterResult};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::config::RouterdConfig;
use crate::network::{NetworkLayer, ShellNetwork};
use crate::publisher::RouterRequirer;
use crate::router_mgr::RouterMgr;
use crate::tables::ROUTER_RELATION;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Relation data encoding for `publish`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// String map with JSON-encoded routes
    Flat,
    /// Nested JSON object
    Json,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Capture commands and print them instead of running them
    pub dry_run: bool,
    pub skip_prepare: bool,
    pub teardown_on_exit: bool,
}

/// Outcome of one reconcile run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Events passed to the reconciler
    pub handled: usize,
    /// Events that failed or asked for a retry
    pub failed: usize,
    /// Lines that did not decode as an event
    pub skipped_lines: usize,
    pub interfaces: usize,
    pub routes: usize,
}

impl ReconcileSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }
}

/// Feed newline-delimited events to `mgr`.
///
/// Blank lines and `#` comments are ignored. Lines that are not valid
/// events are counted and skipped.
pub async fn apply_events<N, R>(
    mgr: &mut RouterMgr<N>,
    reader: R,
) -> Result<ReconcileSummary, DaemonError>
where
    N: NetworkLayer,
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReconcileSummary::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let event: RelationEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                summary.skipped_lines += 1;
                continue;
            }
        };

        let status = process_event(mgr, &event).await;
        summary.handled += 1;
        if status.is_failure() || status.is_retryable() {
            summary.failed += 1;
        }
    }

    summary.interfaces = mgr.interfaces().len();
    summary.routes = mgr.installed_routes().len();
    Ok(summary)
}

/// Run the reconciler over an event stream.
///
/// In dry-run mode the captured commands are written to `out`, one per
/// line.
pub async fn reconcile<R, W>(
    config: &RouterdConfig,
    opts: &ReconcileOptions,
    reader: R,
    out: &mut W,
) -> Result<ReconcileSummary, DaemonError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    info!("--- Starting routerd ---");
    info!(
        relation = ROUTER_RELATION,
        parent = %config.network.parent_interface,
        egress = %config.network.egress_interface,
        dry_run = opts.dry_run,
        "Configuration loaded"
    );

    let mut network = ShellNetwork::new(config.network.parent_interface.clone());
    if opts.dry_run {
        network = network.with_mock_mode();
    }
    let mut mgr = RouterMgr::with_egress(network, config.network.egress_interface.clone());

    if config.network.prepare_on_start && !opts.skip_prepare {
        mgr.prepare().await?;
    }

    let mut summary = apply_events(&mut mgr, reader).await?;

    if opts.teardown_on_exit {
        mgr.remove().await?;
        summary.interfaces = mgr.interfaces().len();
        summary.routes = mgr.installed_routes().len();
    }

    if opts.dry_run {
        for cmd in mgr.network().captured_commands() {
            writeln!(out, "{}", cmd)?;
        }
    }

    info!(
        handled = summary.handled,
        failed = summary.failed,
        skipped_lines = summary.skipped_lines,
        interfaces = summary.interfaces,
        routes = summary.routes,
        "routerd finished"
    );
    Ok(summary)
}

/// Render the relation data a requirer unit would publish.
pub fn publish_output(
    name: &str,
    gateway: &str,
    routes: &[String],
    format: OutputFormat,
) -> RouterResult<String> {
    let mut requirer = RouterRequirer::new(name, gateway)?;
    for route in routes {
        requirer = requirer.with_route_arg(route)?;
    }

    match format {
        OutputFormat::Flat => serde_json::to_string_pretty(&requirer.relation_data()?)
            .map_err(|e| RouterError::internal(e.to_string())),
        OutputFormat::Json => requirer.to_json(),
    }
}
