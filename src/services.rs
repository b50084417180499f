/// Label returned for ports without a well-known service.
pub const UNKNOWN_SERVICE: &str = "Unknown";

/// Well-known TCP ports and the service conventionally bound to them.
///
/// Sorted by port so lookups can binary search.
const WELL_KNOWN: &[(u16, &str)] = &[
    (20, "FTP-Data"),
    (21, "FTP"),
    (22, "SSH"),
    (23, "Telnet"),
    (25, "SMTP"),
    (53, "DNS"),
    (80, "HTTP"),
    (110, "POP3"),
    (143, "IMAP"),
    (443, "HTTPS"),
    (445, "SMB"),
    (3306, "MySQL"),
    (3389, "RDP"),
    (5432, "PostgreSQL"),
    (5900, "VNC"),
    (8080, "HTTP-Proxy"),
    (8443, "HTTPS-Alt"),
    (27017, "MongoDB"),
];

/// Best-effort service label for a port. Never fails; unmapped ports are `"Unknown"`.
pub fn classify(port: u16) -> &'static str {
    WELL_KNOWN
        .binary_search_by_key(&port, |&(p, _)| p)
        .map(|idx| WELL_KNOWN[idx].1)
        .unwrap_or(UNKNOWN_SERVICE)
}
