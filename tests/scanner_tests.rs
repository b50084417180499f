use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use port_scanner::scanner::{
    scan, scan_with_cancel, scan_with_prober, Prober, ProbeFuture, ScanOptions,
};
use port_scanner::types::{PortProbeResult, PortStatus, ScanReport};
use tokio::net::TcpListener;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Stand-in target whose every connect attempt hangs for the full timeout.
#[derive(Clone, Default)]
struct SlowProber {
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
}

impl SlowProber {
    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Prober for SlowProber {
    fn probe(&self, _host: Arc<str>, port: u16, timeout: Duration) -> ProbeFuture {
        let this = self.clone();
        Box::pin(async move {
            let now = this.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            this.peak.fetch_max(now, Ordering::SeqCst);
            time::sleep(timeout).await;
            this.in_flight.fetch_sub(1, Ordering::SeqCst);
            this.finished.fetch_add(1, Ordering::SeqCst);
            PortProbeResult::closed(port)
        })
    }
}

async fn scan_slow(
    prober: &SlowProber,
    ports: &[u16],
    timeout: Duration,
    concurrency: usize,
    cancel: CancellationToken,
) -> ScanReport {
    let opts = ScanOptions { timeout, concurrency };
    scan_with_prober(Arc::new(prober.clone()), "203.0.113.7", ports, &opts, cancel).await
}

async fn listener() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = l.local_addr().unwrap().port();
    (l, port)
}

async fn unused_port() -> u16 {
    let (l, port) = listener().await;
    drop(l);
    port
}

fn opts(timeout_ms: u64, concurrency: usize) -> ScanOptions {
    ScanOptions {
        timeout: Duration::from_millis(timeout_ms),
        concurrency,
    }
}

#[tokio::test]
async fn open_and_closed_ports_are_reported() {
    let (_open, p_open) = listener().await;
    let p_closed = unused_port().await;

    let report = scan("127.0.0.1", &[p_open, p_closed], &opts(1000, 16)).await;

    assert_eq!(report.host, "127.0.0.1");
    assert_eq!(report.total_scanned, 2);
    assert_eq!(report.open_count, 1);
    assert_eq!(report.results.len(), 2);

    let open = report.results.iter().find(|r| r.port == p_open).unwrap();
    assert_eq!(open.status, PortStatus::Open);
    // Ephemeral ports never collide with the well-known table.
    assert_eq!(open.service.as_deref(), Some("Unknown"));

    let closed = report.results.iter().find(|r| r.port == p_closed).unwrap();
    assert_eq!(closed, &PortProbeResult::closed(p_closed));
}

#[tokio::test]
async fn every_port_appears_exactly_once() {
    let mut listeners = Vec::new();
    let mut ports = Vec::new();
    for _ in 0..20 {
        let (l, p) = listener().await;
        listeners.push(l);
        ports.push(p);
    }
    for _ in 0..280 {
        ports.push(unused_port().await);
    }
    let unique: HashSet<u16> = ports.iter().copied().collect();
    let ports: Vec<u16> = unique.iter().copied().collect();

    let report = scan("127.0.0.1", &ports, &opts(1000, 64)).await;

    assert_eq!(report.results.len(), ports.len());
    assert_eq!(report.total_scanned as usize, ports.len());
    let seen: HashSet<u16> = report.results.iter().map(|r| r.port).collect();
    assert_eq!(seen, unique);

    let open = report.results.iter().filter(|r| r.is_open()).count() as u64;
    assert_eq!(report.open_count, open);
    assert!(report.open_count >= 20);
    assert!(report
        .results
        .iter()
        .all(|r| r.is_open() == r.service.is_some()));

    // Sorted by port.
    assert!(report.results.windows(2).all(|w| w[0].port < w[1].port));
}

#[tokio::test(start_paused = true)]
async fn probes_run_concurrently_not_serially() {
    let ports: Vec<u16> = (1..=10).collect();
    let timeout = Duration::from_millis(100);

    let serial = SlowProber::default();
    let start = time::Instant::now();
    let report = scan_slow(&serial, &ports, timeout, 1, CancellationToken::new()).await;
    let serial_elapsed = start.elapsed();
    assert_eq!(report.total_scanned, 10);
    assert_eq!(serial.peak(), 1);
    assert!(
        serial_elapsed >= timeout * 10 && serial_elapsed < timeout * 11,
        "serial scan took {serial_elapsed:?}"
    );

    let parallel = SlowProber::default();
    let start = time::Instant::now();
    let report = scan_slow(&parallel, &ports, timeout, 64, CancellationToken::new()).await;
    let parallel_elapsed = start.elapsed();
    assert_eq!(report.total_scanned, 10);
    assert_eq!(parallel.peak(), 10);
    assert!(
        parallel_elapsed >= timeout && parallel_elapsed < timeout * 2,
        "parallel scan took {parallel_elapsed:?}, expected about one timeout"
    );
}

#[tokio::test(start_paused = true)]
async fn in_flight_probes_never_exceed_concurrency() {
    let ports: Vec<u16> = (1..=10).collect();
    let timeout = Duration::from_millis(100);
    let prober = SlowProber::default();

    let start = time::Instant::now();
    let report = scan_slow(&prober, &ports, timeout, 3, CancellationToken::new()).await;
    let elapsed = start.elapsed();

    assert_eq!(report.results.len(), 10);
    assert_eq!(prober.peak(), 3);
    assert_eq!(prober.finished(), 10);
    // ceil(10 / 3) waves of one timeout each.
    assert!(
        elapsed >= timeout * 4 && elapsed < timeout * 5,
        "bounded scan took {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn cancelling_mid_scan_stops_outstanding_probes() {
    let ports: Vec<u16> = (1..=8).collect();
    let prober = SlowProber::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let start = time::Instant::now();
    let report = scan_slow(&prober, &ports, Duration::from_secs(10), 4, cancel).await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(report.total_scanned, 8);
    assert_eq!(report.open_count, 0);
    assert_eq!(prober.finished(), 0);
    assert_eq!(prober.peak(), 4);
}

#[tokio::test]
async fn concurrency_of_one_still_covers_all_ports() {
    let (_l, p_open) = listener().await;
    let ports = vec![p_open, unused_port().await, unused_port().await];
    let report = scan("127.0.0.1", &ports, &opts(500, 1)).await;
    assert_eq!(report.results.len(), ports.len());
    assert_eq!(report.open_count, 1);
}

#[tokio::test]
async fn cancelled_scan_still_reports_every_port_closed() {
    let (_l, p_open) = listener().await;
    let ports = vec![p_open, 1, 2, 3];
    let cancel = CancellationToken::new();
    cancel.cancel();

    let start = Instant::now();
    let report = scan_with_cancel("127.0.0.1", &ports, &opts(2000, 2), cancel).await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(report.total_scanned, 4);
    assert_eq!(report.open_count, 0);
    assert!(report.results.iter().all(|r| r.status == PortStatus::Closed));
}

#[tokio::test]
async fn empty_port_list_yields_empty_report() {
    let report = scan("127.0.0.1", &[], &ScanOptions::default()).await;
    assert_eq!(report.total_scanned, 0);
    assert_eq!(report.open_count, 0);
    assert!(report.results.is_empty());
}
