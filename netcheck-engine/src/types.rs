//! Public types returned by engine operations.
//!
//! The three result shapes are bound directly by the GUI, so their field names
//! stay snake_case and optional fields serialize as explicit `null`.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// DNS record types resolved for every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordKind {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Name server record.
    Ns,
    /// Mail exchange record.
    Mx,
    /// Text record.
    Txt,
}

impl DnsRecordKind {
    /// Every kind, in the order the lists appear in [`DnsResult`].
    pub const ALL: [Self; 5] = [Self::A, Self::Aaaa, Self::Ns, Self::Mx, Self::Txt];
}

impl fmt::Display for DnsRecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::Aaaa => write!(f, "AAAA"),
            Self::Ns => write!(f, "NS"),
            Self::Mx => write!(f, "MX"),
            Self::Txt => write!(f, "TXT"),
        }
    }
}

impl FromStr for DnsRecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::Aaaa),
            "NS" => Ok(Self::Ns),
            "MX" => Ok(Self::Mx),
            "TXT" => Ok(Self::Txt),
            _ => Err(format!("Unsupported DNS record type: {s}")),
        }
    }
}

/// Classification of a sub-check failure.
///
/// Every `error` string produced by the engine starts with [`FailureKind::message`],
/// which lets callers tell a timeout from a refusal without parsing free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Refused,
    Reset,
    Unreachable,
    Resolution,
    Transport,
    TlsHandshake,
    NoCertificate,
    CertificateParse,
    HttpStatus,
}

impl FailureKind {
    const VARIANTS: [Self; 10] = [
        Self::Timeout,
        Self::Refused,
        Self::Reset,
        Self::Unreachable,
        Self::Resolution,
        Self::Transport,
        Self::TlsHandshake,
        Self::NoCertificate,
        Self::CertificateParse,
        Self::HttpStatus,
    ];

    /// Stable machine-readable code.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Refused => "refused",
            Self::Reset => "reset",
            Self::Unreachable => "unreachable",
            Self::Resolution => "resolution",
            Self::Transport => "transport",
            Self::TlsHandshake => "tls_handshake",
            Self::NoCertificate => "no_certificate",
            Self::CertificateParse => "certificate_parse",
            Self::HttpStatus => "http_status",
        }
    }

    /// Human-readable prefix of every error message of this kind.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Timeout => "timed out",
            Self::Refused => "connection refused",
            Self::Reset => "connection reset",
            Self::Unreachable => "network unreachable",
            Self::Resolution => "name resolution failed",
            Self::Transport => "connection failed",
            Self::TlsHandshake => "tls handshake failed",
            Self::NoCertificate => "no certificate presented",
            Self::CertificateParse => "certificate parse failed",
            Self::HttpStatus => "unexpected http status",
        }
    }

    /// Whether a retry has a reasonable chance of a different outcome.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Reset | Self::Transport)
    }

    /// Recover the kind from an error string produced by the engine.
    pub fn classify(error: &str) -> Option<Self> {
        Self::VARIANTS
            .into_iter()
            .find(|kind| error.starts_with(kind.message()))
    }

    /// Map an I/O error raised by a socket operation.
    pub fn from_io(err: &std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::Reset
            }
            ErrorKind::TimedOut => Self::Timeout,
            ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => Self::Unreachable,
            _ => Self::Transport,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with optional detail, rendered into result `error` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub const fn bare(kind: FailureKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        match FailureKind::from_io(err) {
            // The kind already says everything for these two.
            kind @ (FailureKind::Refused | FailureKind::Timeout) => Self::bare(kind),
            kind => Self::new(kind, err.to_string()),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind.message()),
            None => f.write_str(self.kind.message()),
        }
    }
}

/// Result of a reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityResult {
    /// Whether a connection (and, for HTTP probes, an acceptable response) was obtained.
    pub is_reachable: bool,
    /// Time to establish the connection, or time until the failure was detected.
    pub response_time_ms: u64,
    /// HTTP status code (application-layer probes only).
    #[serde(default)]
    pub status_code: Option<u16>,
    /// Failure cause.
    #[serde(default)]
    pub error: Option<String>,
}

impl ConnectivityResult {
    pub const fn reachable(response_time_ms: u64, status_code: Option<u16>) -> Self {
        Self {
            is_reachable: true,
            response_time_ms,
            status_code,
            error: None,
        }
    }

    pub fn unreachable(response_time_ms: u64, failure: &Failure) -> Self {
        Self {
            is_reachable: false,
            response_time_ms,
            status_code: None,
            error: Some(failure.to_string()),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_deref().and_then(FailureKind::classify)
    }
}

/// DNS records of a target, grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsResult {
    pub a_records: Vec<String>,
    pub aaaa_records: Vec<String>,
    pub ns_records: Vec<String>,
    /// `"<preference> <exchange>"`.
    pub mx_records: Vec<String>,
    pub txt_records: Vec<String>,
    /// Set when the lookup as a whole failed, not when a type has no records.
    #[serde(default)]
    pub error: Option<String>,
}

impl DnsResult {
    pub fn failed(failure: &Failure) -> Self {
        Self {
            error: Some(failure.to_string()),
            ..Self::default()
        }
    }

    /// Mutable access to the list holding records of `kind`.
    pub fn records_mut(&mut self, kind: DnsRecordKind) -> &mut Vec<String> {
        match kind {
            DnsRecordKind::A => &mut self.a_records,
            DnsRecordKind::Aaaa => &mut self.aaaa_records,
            DnsRecordKind::Ns => &mut self.ns_records,
            DnsRecordKind::Mx => &mut self.mx_records,
            DnsRecordKind::Txt => &mut self.txt_records,
        }
    }

    pub fn records(&self, kind: DnsRecordKind) -> &[String] {
        match kind {
            DnsRecordKind::A => &self.a_records,
            DnsRecordKind::Aaaa => &self.aaaa_records,
            DnsRecordKind::Ns => &self.ns_records,
            DnsRecordKind::Mx => &self.mx_records,
            DnsRecordKind::Txt => &self.txt_records,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_deref().and_then(FailureKind::classify)
    }
}

/// Leaf certificate metadata.
///
/// Timestamps are Unix epoch seconds (UTC). When `error` is set every other
/// field is empty or zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Subject distinguished name (e.g. `"CN=example.com"`).
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Not-before, Unix seconds.
    pub valid_from: i64,
    /// Not-after, Unix seconds.
    pub valid_until: i64,
    /// Serial number, upper-case hex.
    pub serial_number: String,
    /// X.509 version (`3` for v3 certificates).
    pub version: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl CertificateInfo {
    pub fn failed(failure: &Failure) -> Self {
        Self {
            error: Some(failure.to_string()),
            ..Self::default()
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_deref().and_then(FailureKind::classify)
    }
}

/// Protocol used by the connectivity prober.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeProtocol {
    /// Plain TCP connect.
    Tcp,
    /// HTTP GET over cleartext.
    Http,
    /// HTTP GET over TLS.
    #[default]
    Https,
}

impl ProbeProtocol {
    /// Port used when the target does not name one.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Tcp | Self::Https => 443,
        }
    }
}

impl fmt::Display for ProbeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => write!(f, "tcp"),
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

impl FromStr for ProbeProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            _ => Err(format!("Unsupported probe protocol: {s}")),
        }
    }
}

/// A host under diagnostic test, with optional per-check overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiagnosticTarget {
    pub host: String,
    #[serde(default)]
    pub connectivity_port: Option<u16>,
    #[serde(default)]
    pub certificate_port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<ProbeProtocol>,
}

impl DiagnosticTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            connectivity_port: None,
            certificate_port: None,
            protocol: None,
        }
    }

    /// Use `port` for both the connectivity probe and the certificate inspection.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.connectivity_port = Some(port);
        self.certificate_port = Some(port);
        self
    }

    #[must_use]
    pub const fn with_protocol(mut self, protocol: ProbeProtocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Identity under which the target appears in a [`DiagnosticReport`].
    ///
    /// Distinct targets always get distinct keys: an explicit protocol becomes a
    /// `proto://` prefix, and ports read `connectivity/certificate` unless both
    /// checks share one. `-` marks a port left to the default.
    pub fn key(&self) -> String {
        let host = if self.host.parse::<std::net::Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let host = match self.protocol {
            Some(protocol) => format!("{protocol}://{host}"),
            None => host,
        };
        match (self.connectivity_port, self.certificate_port) {
            (Some(c), Some(t)) if c == t => format!("{host}:{c}"),
            (Some(c), Some(t)) => format!("{host}:{c}/{t}"),
            (Some(c), None) => format!("{host}:{c}/-"),
            (None, Some(t)) => format!("{host}:-/{t}"),
            (None, None) => host,
        }
    }
}

impl FromStr for DiagnosticTarget {
    type Err = String;

    /// Accepts `host`, `host:port`, `[v6]:port` and bare IPv6 literals.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Target is empty".to_string());
        }
        if s.parse::<IpAddr>().is_ok() {
            return Ok(Self::new(s));
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("Unterminated IPv6 literal: {s}"))?;
            if tail.is_empty() {
                return Ok(Self::new(host));
            }
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| format!("Invalid target: {s}"))?;
            return Ok(Self::new(host).with_port(parse_port(port)?));
        }

        match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => {
                Ok(Self::new(host).with_port(parse_port(port)?))
            }
            Some(_) => Err(format!("Invalid target: {s}")),
            None => Ok(Self::new(s)),
        }
    }
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("Invalid port: {port}")),
        Ok(p) => Ok(p),
    }
}

/// Outcome of all sub-checks for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub target: DiagnosticTarget,
    pub connectivity: ConnectivityResult,
    pub dns: DnsResult,
    pub certificate: CertificateInfo,
    /// Start of the run for this target, Unix seconds.
    pub started_at: i64,
    /// Wall-clock time spent on this target.
    pub elapsed_ms: u64,
}

/// Composite report for a diagnostic request, keyed by [`DiagnosticTarget::key`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub targets: BTreeMap<String, TargetReport>,
    pub total_time_ms: u64,
}

impl DiagnosticReport {
    pub fn get(&self, key: &str) -> Option<&TargetReport> {
        self.targets.get(key)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
