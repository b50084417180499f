use serde::{Deserialize, Serialize};

use crate::services;

/// Binary reachability of a single TCP port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    Open,
    Closed,
}

/// Outcome of probing one port. `service` is only set for open ports.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortProbeResult {
    pub port: u16,
    pub status: PortStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl PortProbeResult {
    pub fn open(port: u16) -> Self {
        Self {
            port,
            status: PortStatus::Open,
            service: Some(services::classify(port).to_string()),
        }
    }

    pub fn closed(port: u16) -> Self {
        Self {
            port,
            status: PortStatus::Closed,
            service: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PortStatus::Open
    }
}

/// Incoming scan request as sent by clients. Validation happens in `ports::normalize`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub ports: Vec<u16>,
}

/// Aggregate report for one scan of one host.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub host: String,
    pub results: Vec<PortProbeResult>,
    pub total_scanned: u64,
    #[serde(rename = "open_ports")]
    pub open_count: u64,
    pub started_at: String,
    pub duration_ms: u64,
}

impl ScanReport {
    /// Build a report from the collected results, ordering them by port and
    /// deriving both counters from the result set itself.
    pub fn from_results(
        host: impl Into<String>,
        mut results: Vec<PortProbeResult>,
        started_at: String,
        duration_ms: u64,
    ) -> Self {
        results.sort_by_key(|r| r.port);
        let open_count = results.iter().filter(|r| r.is_open()).count() as u64;
        Self {
            host: host.into(),
            total_scanned: results.len() as u64,
            open_count,
            results,
            started_at,
            duration_ms,
        }
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &PortProbeResult> {
        self.results.iter().filter(|r| r.is_open())
    }
}
