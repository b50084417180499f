use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use port_scanner::scanner::{self, ScanOptions, DEFAULT_CONCURRENCY};
use port_scanner::server::{self, AppState, DEFAULT_BIND};
use port_scanner::types::{PortStatus, ScanReport, ScanRequest};
use port_scanner::ports;

/// port-scanner — TCP connect reachability checks with well-known service labels.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-scanner",
    version,
    about = "TCP connect port scanner: HTTP service by default, or a one-shot scan with --host.",
    long_about = None
)]
struct Cli {
    /// Address for the HTTP service.
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Max concurrent TCP connect attempts per scan.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Socket connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 2000)]
    timeout_ms: u64,

    /// Scan this host once, print the results and exit instead of serving HTTP.
    #[arg(long)]
    host: Option<String>,

    /// Ports for the one-shot scan, e.g. "22,80,8000-8010". Defaults to the common-port list.
    #[arg(long)]
    ports: Option<String>,

    /// Write one-shot results as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("port_scanner=info,tower_http=info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let opts = ScanOptions {
        timeout: Duration::from_millis(cli.timeout_ms),
        concurrency: cli.concurrency,
    };

    if let Some(host) = cli.host.clone() {
        return run_once(&cli, host, opts).await;
    }

    info!(bind = %cli.bind, concurrency = opts.concurrency, timeout_ms = cli.timeout_ms, "starting port scanner service");
    if let Err(e) = server::serve(&cli.bind, AppState::new(opts)).await {
        error!("server failed: {e:#}");
        return Err(e);
    }
    Ok(())
}

async fn run_once(cli: &Cli, host: String, opts: ScanOptions) -> Result<()> {
    let port_list = match cli.ports.as_deref() {
        Some(spec) => ports::parse_ports_str(spec).context("invalid --ports")?,
        None => Vec::new(),
    };
    let target = ports::normalize(ScanRequest { host, ports: port_list })?;

    // Ctrl+C cancels the outstanding probes.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let report = scanner::scan_with_cancel(&target.host, &target.ports, &opts, cancel).await;
    print_results_table(&report);

    if let Some(path) = cli.output.as_deref() {
        match write_report_json(path, &report) {
            Ok(()) => info!(path = %path.display(), "wrote JSON results"),
            Err(e) => error!(path = %path.display(), "failed to write JSON: {e:#}"),
        }
    }
    Ok(())
}

fn print_results_table(report: &ScanReport) {
    let port_w = 5usize.max("port".len());
    let status_w = "closed".len().max("status".len());
    let service_w = report
        .results
        .iter()
        .filter_map(|r| r.service.as_ref().map(String::len))
        .max()
        .unwrap_or(0)
        .max("service".len());

    println!(
        "\n{}: open ports: {} (scanned: {}, {} ms)",
        report.host, report.open_count, report.total_scanned, report.duration_ms
    );
    println!(
        "{:>port_w$}  {:<status_w$}  {:<service_w$}",
        "port", "status", "service",
    );
    println!("{:-<port_w$}  {:-<status_w$}  {:-<service_w$}", "", "", "");
    for r in &report.results {
        let status = match r.status {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
        };
        let service = r.service.as_deref().unwrap_or("");
        println!(
            "{:>port_w$}  {:<status_w$}  {:<service_w$}",
            r.port, status, service,
        );
    }
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
