use crate::types::{PortProbeResult, ScanReport};
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ::time::{format_description::well_known, OffsetDateTime};

/// Per-port connect timeout used when the caller does not configure one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
/// Default cap on simultaneous connection attempts.
pub const DEFAULT_CONCURRENCY: usize = 256;
const MAX_CONCURRENCY: usize = 5_000;

/// Knobs for a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Upper bound for each individual connect attempt.
    pub timeout: Duration,
    /// Maximum number of probes in flight at once (clamped to 1..=5000).
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ScanOptions {
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

/// Make exactly one TCP connect attempt to `host:port`, bounded by `timeout`.
///
/// A completed handshake is closed right away and reported open with its
/// service label. Refusal, timeout, unreachable hosts and resolution failures
/// all collapse to closed.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> PortProbeResult {
    match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            debug!(host, port, "port open");
            PortProbeResult::open(port)
        }
        Ok(Err(e)) => {
            debug!(host, port, error = %e, "connect failed");
            PortProbeResult::closed(port)
        }
        Err(_) => {
            debug!(host, port, ?timeout, "connect timed out");
            PortProbeResult::closed(port)
        }
    }
}

pub type ProbeFuture = Pin<Box<dyn Future<Output = PortProbeResult> + Send + 'static>>;

/// A single-attempt reachability check the coordinator fans out per port.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, host: Arc<str>, port: u16, timeout: Duration) -> ProbeFuture;
}

/// Plain TCP connect, see [`probe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProber;

impl Prober for TcpProber {
    fn probe(&self, host: Arc<str>, port: u16, timeout: Duration) -> ProbeFuture {
        Box::pin(async move { probe(&host, port, timeout).await })
    }
}

/// Like [`probe`], but gives up as closed as soon as `cancel` fires.
pub async fn probe_with_cancel(
    host: &str,
    port: u16,
    timeout: Duration,
    cancel: &CancellationToken,
) -> PortProbeResult {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => PortProbeResult::closed(port),
        res = probe(host, port, timeout) => res,
    }
}

/// Probe every port on `host` concurrently and aggregate the outcomes.
///
/// - Limits in-flight connects with a `Semaphore`.
/// - Waits for every probe before building the report; results are sorted by port.
pub async fn scan(host: &str, ports: &[u16], opts: &ScanOptions) -> ScanReport {
    scan_with_cancel(host, ports, opts, CancellationToken::new()).await
}

/// Variant that accepts a `CancellationToken` to stop outstanding probes early.
///
/// Probes cut short by cancellation, or never started because of it, are
/// reported closed, so the report still holds one entry per port.
pub async fn scan_with_cancel(
    host: &str,
    ports: &[u16],
    opts: &ScanOptions,
    cancel: CancellationToken,
) -> ScanReport {
    scan_with_prober(Arc::new(TcpProber), host, ports, opts, cancel).await
}

/// Coordinator over an arbitrary [`Prober`]. At most `opts.concurrency`
/// probes run at once; the rest wait for a permit.
pub async fn scan_with_prober(
    prober: Arc<dyn Prober>,
    host: &str,
    ports: &[u16],
    opts: &ScanOptions,
    cancel: CancellationToken,
) -> ScanReport {
    let started_at = now_rfc3339();
    let clock = Instant::now();
    let concurrency = opts.effective_concurrency();
    info!(host, ports = ports.len(), concurrency, timeout = ?opts.timeout, "scan started");

    let host_arc: Arc<str> = Arc::from(host);
    let sem = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();
    let mut results = Vec::with_capacity(ports.len());

    for &port in ports {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = sem.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            results.push(PortProbeResult::closed(port));
            continue;
        };

        let attempt = prober.probe(host_arc.clone(), port, opts.timeout);
        let cancel = cancel.clone();
        set.spawn(async move {
            let _permit = permit; // keep permit until the attempt concludes
            tokio::select! {
                biased;
                _ = cancel.cancelled() => PortProbeResult::closed(port),
                res = attempt => res,
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(host, error = %e, "probe task failed"),
        }
    }

    // A task that died without reporting still owes its port an entry.
    if results.len() < ports.len() {
        let seen: HashSet<u16> = results.iter().map(|r| r.port).collect();
        for &port in ports {
            if !seen.contains(&port) {
                results.push(PortProbeResult::closed(port));
            }
        }
    }

    let report = ScanReport::from_results(
        host,
        results,
        started_at,
        clock.elapsed().as_millis() as u64,
    );
    if cancel.is_cancelled() {
        warn!(host, "scan cancelled before completion");
    }
    info!(
        host,
        total = report.total_scanned,
        open = report.open_count,
        duration_ms = report.duration_ms,
        "scan completed"
    );
    report
}

fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
