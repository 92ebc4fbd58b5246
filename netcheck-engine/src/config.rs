//! Engine configuration.
//!
//! Every field has a default, so an empty TOML document is a valid configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::ProbeProtocol;

const DNS_PORT: u16 = 53;

/// Upper bound for `prober.retries`.
pub const MAX_PROBE_RETRIES: u32 = 3;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dns: DnsConfig,
    pub prober: ProberConfig,
    pub certificate: CertificateConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Nameservers as `ip` or `ip:port` (`[v6]:port`); empty means the host
    /// system configuration.
    pub nameservers: Vec<String>,
    /// Timeout of a single record-type lookup.
    pub lookup_timeout_ms: u64,
    /// Deadline for all five lookups together.
    pub overall_timeout_ms: u64,
    /// Attempts per query made by the resolver itself.
    pub attempts: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            lookup_timeout_ms: 3000,
            overall_timeout_ms: 5000,
            attempts: 2,
        }
    }
}

impl DnsConfig {
    pub const fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub const fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// Time a DNS check may spend on its lookups.
    pub fn budget(&self) -> Duration {
        self.lookup_timeout().min(self.overall_timeout())
    }

    /// Parsed nameserver addresses, port 53 unless one is given.
    pub fn nameserver_addrs(&self) -> EngineResult<Vec<SocketAddr>> {
        self.nameservers
            .iter()
            .map(|ns| {
                let ns = ns.trim();
                ns.parse::<SocketAddr>()
                    .or_else(|_| ns.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, DNS_PORT)))
                    .map_err(|_| {
                        EngineError::ConfigError(format!("Invalid DNS server address: {ns}"))
                    })
            })
            .collect()
    }
}

/// Connectivity prober settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    /// Protocol used when a target does not specify one.
    pub protocol: ProbeProtocol,
    /// Timeout of one probe attempt.
    pub timeout_ms: u64,
    /// Extra attempts after a transient failure.
    pub retries: u32,
    /// Treat HTTP statuses outside 200-399 as unreachable.
    pub require_success_status: bool,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            protocol: ProbeProtocol::Https,
            timeout_ms: 5000,
            retries: 0,
            require_success_status: false,
        }
    }
}

impl ProberConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Certificate inspector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Port used when a target does not specify one.
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            port: 443,
            connect_timeout_ms: 5000,
            handshake_timeout_ms: 5000,
        }
    }
}

impl CertificateConfig {
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Wall-clock budget for all sub-checks of one target.
    pub target_deadline_ms: u64,
    /// Number of targets diagnosed at the same time.
    pub max_concurrent_targets: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            target_deadline_ms: 10_000,
            max_concurrent_targets: 8,
        }
    }
}

impl OrchestratorConfig {
    pub const fn target_deadline(&self) -> Duration {
        Duration::from_millis(self.target_deadline_ms)
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| EngineError::ConfigError(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file. A missing file yields the default configuration.
    pub fn load(path: &Path) -> EngineResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(EngineError::ConfigError(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// Reject settings the engine cannot honour.
    pub fn validate(&self) -> EngineResult<()> {
        let timeouts = [
            ("dns.lookup_timeout_ms", self.dns.lookup_timeout_ms),
            ("dns.overall_timeout_ms", self.dns.overall_timeout_ms),
            ("prober.timeout_ms", self.prober.timeout_ms),
            (
                "certificate.connect_timeout_ms",
                self.certificate.connect_timeout_ms,
            ),
            (
                "certificate.handshake_timeout_ms",
                self.certificate.handshake_timeout_ms,
            ),
            (
                "orchestrator.target_deadline_ms",
                self.orchestrator.target_deadline_ms,
            ),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(EngineError::ConfigError(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.dns.attempts == 0 {
            return Err(EngineError::ConfigError(
                "dns.attempts must be at least 1".to_string(),
            ));
        }
        if self.prober.retries > MAX_PROBE_RETRIES {
            return Err(EngineError::ConfigError(format!(
                "prober.retries must not exceed {MAX_PROBE_RETRIES} (got {})",
                self.prober.retries
            )));
        }
        if self.certificate.port == 0 {
            return Err(EngineError::ConfigError(
                "certificate.port must not be 0".to_string(),
            ));
        }
        if self.orchestrator.max_concurrent_targets == 0 {
            return Err(EngineError::ConfigError(
                "orchestrator.max_concurrent_targets must be at least 1".to_string(),
            ));
        }
        self.dns.nameserver_addrs()?;
        Ok(())
    }
}
