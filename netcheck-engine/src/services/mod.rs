//! Service façade exposing all diagnostic operations.
//!
//! A [`DiagnosticsService`] owns the resolver, HTTP client and TLS connector
//! shared by every check it runs. All of them are read-only after
//! construction, so one instance can serve concurrent requests.

mod certificate;
mod connectivity;
mod dns;
mod orchestrator;
mod resolver;
#[cfg(test)]
pub(crate) mod test_servers;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use reqwest::Client;
use tokio_rustls::TlsConnector;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{
    CertificateInfo, ConnectivityResult, DiagnosticReport, DiagnosticTarget, DnsResult,
    ProbeProtocol, TargetReport,
};

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    #[allow(clippy::cast_possible_truncation)]
    let ms = start.elapsed().as_millis() as u64;
    ms
}

/// Validate and normalise a host name or IP address input.
///
/// Trims whitespace, passes through valid IP addresses unchanged (bracketed
/// IPv6 literals lose their brackets), converts internationalised domain names
/// (IDN) to ASCII via IDNA 2008, and rejects empty or overlong inputs.
fn validate_host(host: &str) -> EngineResult<String> {
    let host = host.trim();
    if host.is_empty() {
        return Err(EngineError::ValidationError("Host is required".to_string()));
    }
    let unbracketed = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if unbracketed.parse::<std::net::IpAddr>().is_ok() {
        return Ok(unbracketed.to_string());
    }
    let ascii_host = idna::domain_to_ascii_strict(host)
        .map_err(|_| EngineError::ValidationError(format!("Invalid host name: {host}")))?;
    if ascii_host.len() > 253 {
        return Err(EngineError::ValidationError(format!(
            "Host name exceeds maximum length of 253 characters (got {})",
            ascii_host.len()
        )));
    }
    Ok(ascii_host)
}

fn validate_port(port: Option<u16>) -> EngineResult<Option<u16>> {
    match port {
        Some(0) => Err(EngineError::ValidationError(
            "Port must be between 1 and 65535".to_string(),
        )),
        other => Ok(other),
    }
}

fn validate_target(target: &DiagnosticTarget) -> EngineResult<DiagnosticTarget> {
    Ok(DiagnosticTarget {
        host: validate_host(&target.host)?,
        connectivity_port: validate_port(target.connectivity_port)?,
        certificate_port: validate_port(target.certificate_port)?,
        protocol: target.protocol,
    })
}

/// The capability through which callers run diagnostics.
///
/// Individual check failures are reported inside the returned results; an
/// `Err` only means the request itself was rejected.
#[async_trait]
pub trait DiagnosticsProvider: Send + Sync {
    /// Diagnose every target and aggregate the results, keyed by target.
    async fn run_diagnostics(
        &self,
        targets: &[DiagnosticTarget],
    ) -> EngineResult<DiagnosticReport>;

    /// Probe reachability of `host`. Port and protocol fall back to the configuration.
    async fn check_connectivity(
        &self,
        host: &str,
        port: Option<u16>,
        protocol: Option<ProbeProtocol>,
    ) -> EngineResult<ConnectivityResult>;

    /// Resolve the A, AAAA, NS, MX and TXT records of `host`.
    async fn check_dns(&self, host: &str) -> EngineResult<DnsResult>;

    /// Retrieve the leaf certificate served by `host` (port 443 by default).
    async fn get_certificate_info(
        &self,
        host: &str,
        port: Option<u16>,
    ) -> EngineResult<CertificateInfo>;
}

/// Entry point for all network diagnostic operations.
///
/// ```rust,no_run
/// use netcheck_engine::{DiagnosticTarget, DiagnosticsService, EngineConfig};
/// # async fn demo() -> netcheck_engine::EngineResult<()> {
/// let service = DiagnosticsService::new(EngineConfig::default())?;
/// let report = service
///     .run_diagnostics(&[DiagnosticTarget::new("example.com")])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DiagnosticsService {
    config: Arc<EngineConfig>,
    resolver: TokioResolver,
    http: Client,
    tls: TlsConnector,
}

impl DiagnosticsService {
    /// Validate `config` and build the shared network clients.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let resolver = resolver::build_resolver(&config.dns)?;
        let http = connectivity::build_http_client(&config.prober)?;
        let tls = certificate::build_tls_connector()?;
        log::debug!(
            "[DIAG] Engine ready (nameservers: {})",
            resolver::nameserver_label(&config.dns)
        );
        Ok(Self {
            config: Arc::new(config),
            resolver,
            http,
            tls,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Description of the nameservers DNS checks are sent to.
    pub fn nameservers(&self) -> String {
        resolver::nameserver_label(&self.config.dns)
    }

    pub async fn check_dns(&self, host: &str) -> EngineResult<DnsResult> {
        let host = validate_host(host)?;
        Ok(dns::check_dns(&self.resolver, &host, self.config.dns.budget()).await)
    }

    pub async fn check_connectivity(
        &self,
        host: &str,
        port: Option<u16>,
        protocol: Option<ProbeProtocol>,
    ) -> EngineResult<ConnectivityResult> {
        let host = validate_host(host)?;
        let protocol = protocol.unwrap_or(self.config.prober.protocol);
        let port = validate_port(port)?.unwrap_or_else(|| protocol.default_port());
        Ok(self.probe(&host, port, protocol).await)
    }

    pub async fn get_certificate_info(
        &self,
        host: &str,
        port: Option<u16>,
    ) -> EngineResult<CertificateInfo> {
        let host = validate_host(host)?;
        let port = validate_port(port)?.unwrap_or(self.config.certificate.port);
        Ok(self.inspect(&host, port).await)
    }

    /// Diagnose `targets` concurrently.
    ///
    /// Every target is validated before any network activity starts; duplicate
    /// targets are diagnosed once.
    pub async fn run_diagnostics(
        &self,
        targets: &[DiagnosticTarget],
    ) -> EngineResult<DiagnosticReport> {
        if targets.is_empty() {
            return Err(EngineError::ValidationError(
                "At least one target is required".to_string(),
            ));
        }
        let targets = targets
            .iter()
            .map(validate_target)
            .collect::<EngineResult<Vec<_>>>()?;
        let targets = orchestrator::dedupe_targets(targets);

        Ok(orchestrator::run_all(
            targets,
            self.config.orchestrator.max_concurrent_targets,
            |target| self.diagnose(target),
        )
        .await)
    }

    async fn diagnose(&self, target: DiagnosticTarget) -> TargetReport {
        let protocol = target.protocol.unwrap_or(self.config.prober.protocol);
        let connectivity_port = target
            .connectivity_port
            .unwrap_or_else(|| protocol.default_port());
        let certificate_port = target
            .certificate_port
            .unwrap_or(self.config.certificate.port);
        let host = target.host.clone();
        let deadline = self.config.orchestrator.target_deadline();
        // Lookups that outlive the deadline would take the answers already in
        // with them, so the DNS check winds down just before it.
        let dns_budget = orchestrator::budget_within(self.config.dns.budget(), deadline);

        orchestrator::diagnose_target(
            target,
            deadline,
            self.probe(&host, connectivity_port, protocol),
            dns::check_dns(&self.resolver, &host, dns_budget),
            self.inspect(&host, certificate_port),
        )
        .await
    }

    async fn probe(&self, host: &str, port: u16, protocol: ProbeProtocol) -> ConnectivityResult {
        connectivity::check_connectivity(&self.http, host, port, protocol, &self.config.prober)
            .await
    }

    async fn inspect(&self, host: &str, port: u16) -> CertificateInfo {
        certificate::inspect_certificate(&self.tls, host, port, &self.config.certificate).await
    }
}

#[async_trait]
impl DiagnosticsProvider for DiagnosticsService {
    async fn run_diagnostics(
        &self,
        targets: &[DiagnosticTarget],
    ) -> EngineResult<DiagnosticReport> {
        Self::run_diagnostics(self, targets).await
    }

    async fn check_connectivity(
        &self,
        host: &str,
        port: Option<u16>,
        protocol: Option<ProbeProtocol>,
    ) -> EngineResult<ConnectivityResult> {
        Self::check_connectivity(self, host, port, protocol).await
    }

    async fn check_dns(&self, host: &str) -> EngineResult<DnsResult> {
        Self::check_dns(self, host).await
    }

    async fn get_certificate_info(
        &self,
        host: &str,
        port: Option<u16>,
    ) -> EngineResult<CertificateInfo> {
        Self::get_certificate_info(self, host, port).await
    }
}
