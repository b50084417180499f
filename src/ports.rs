use anyhow::{bail, Context, Result};
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::ScanRequest;

/// Ports probed when a request does not name any:
/// FTP, SSH, Telnet, SMTP, HTTP, POP3, IMAP, HTTPS, SMB, MySQL, RDP, PostgreSQL, HTTP-Proxy.
pub const DEFAULT_PORTS: [u16; 13] = [21, 22, 23, 25, 80, 110, 143, 443, 445, 3306, 3389, 5432, 8080];

pub fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}

/// A validated request: non-empty host and the exact set of ports to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedScan {
    pub host: String,
    pub ports: Vec<u16>,
}

/// Validate a request and substitute the default port list when none was given.
///
/// Duplicate ports are dropped (first occurrence wins) so each port is probed once.
pub fn normalize(req: ScanRequest) -> Result<NormalizedScan, ValidationError> {
    let host = req.host.trim();
    if host.is_empty() {
        return Err(ValidationError::MissingHost);
    }
    if let Some(&bad) = req.ports.iter().find(|&&p| p == 0) {
        return Err(ValidationError::InvalidPort(bad));
    }

    let ports = if req.ports.is_empty() {
        default_ports()
    } else {
        dedup_in_order(req.ports)
    };

    Ok(NormalizedScan {
        host: host.to_string(),
        ports,
    })
}

fn dedup_in_order(ports: Vec<u16>) -> Vec<u16> {
    let mut seen = HashSet::with_capacity(ports.len());
    ports.into_iter().filter(|p| seen.insert(*p)).collect()
}

/// Parse a port list such as `22,80,8000-8010` into deduplicated ports (1..=65535).
///
/// Entries may be separated by commas or newlines; everything after `#` on a
/// line is a comment. Ranges are inclusive.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");

        for item in line.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some((a, b)) = item.split_once('-') {
                let start = parse_port_str(a.trim())
                    .with_context(|| format!("line {line_no}: invalid start in range: {a}"))?;
                let end = parse_port_str(b.trim())
                    .with_context(|| format!("line {line_no}: invalid end in range: {b}"))?;
                if start > end {
                    bail!("line {line_no}: invalid range {start}-{end} (start > end)");
                }
                for p in start..=end {
                    if seen.insert(p) {
                        out.push(p);
                    }
                }
                continue;
            }

            let p = parse_port_str(item)
                .with_context(|| format!("line {line_no}: invalid port value: {item}"))?;
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    Ok(out)
}

fn parse_port_str(s: &str) -> Result<u16> {
    let val: u32 = s.parse::<u32>()?;
    if val == 0 || val > 65535 {
        bail!("port out of range: {val}");
    }
    Ok(val as u16)
}
