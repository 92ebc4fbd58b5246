use super::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use netcheck_engine::{
    CertificateInfo, ConnectivityResult, DiagnosticReport, DnsResult, Failure, FailureKind,
    TargetReport,
};
use tokio::sync::Mutex;

/// Engine double that records its calls and returns canned results.
#[derive(Default)]
pub struct MockDiagnosticsProvider {
    run_calls: Mutex<Vec<Vec<DiagnosticTarget>>>,
    connectivity_calls: Mutex<Vec<(String, Option<u16>, Option<ProbeProtocol>)>>,
    dns_calls: Mutex<Vec<String>>,
    certificate_calls: Mutex<Vec<(String, Option<u16>)>>,
    delay: Mutex<Option<Duration>>,
    error: Mutex<Option<EngineError>>,
}

impl MockDiagnosticsProvider {
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().await = delay;
    }

    pub async fn set_error(&self, error: Option<EngineError>) {
        *self.error.lock().await = error;
    }

    pub async fn run_calls(&self) -> Vec<Vec<DiagnosticTarget>> {
        self.run_calls.lock().await.clone()
    }

    pub async fn connectivity_calls(&self) -> Vec<(String, Option<u16>, Option<ProbeProtocol>)> {
        self.connectivity_calls.lock().await.clone()
    }

    pub async fn dns_calls(&self) -> Vec<String> {
        self.dns_calls.lock().await.clone()
    }

    pub async fn certificate_calls(&self) -> Vec<(String, Option<u16>)> {
        self.certificate_calls.lock().await.clone()
    }

    /// Apply the configured delay, then fail if an error is configured.
    async fn respond(&self) -> EngineResult<()> {
        if let Some(delay) = *self.delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        match self.error.lock().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DiagnosticsProvider for MockDiagnosticsProvider {
    async fn run_diagnostics(
        &self,
        targets: &[DiagnosticTarget],
    ) -> EngineResult<DiagnosticReport> {
        self.run_calls.lock().await.push(targets.to_vec());
        self.respond().await?;

        let targets = targets
            .iter()
            .map(|target| (target.key(), target_report(target.clone())))
            .collect::<BTreeMap<_, _>>();
        Ok(DiagnosticReport {
            targets,
            total_time_ms: 12,
        })
    }

    async fn check_connectivity(
        &self,
        host: &str,
        port: Option<u16>,
        protocol: Option<ProbeProtocol>,
    ) -> EngineResult<ConnectivityResult> {
        self.connectivity_calls
            .lock()
            .await
            .push((host.to_string(), port, protocol));
        self.respond().await?;
        Ok(ConnectivityResult::reachable(8, Some(200)))
    }

    async fn check_dns(&self, host: &str) -> EngineResult<DnsResult> {
        self.dns_calls.lock().await.push(host.to_string());
        self.respond().await?;
        Ok(dns_result())
    }

    async fn get_certificate_info(
        &self,
        host: &str,
        port: Option<u16>,
    ) -> EngineResult<CertificateInfo> {
        self.certificate_calls
            .lock()
            .await
            .push((host.to_string(), port));
        self.respond().await?;
        Ok(certificate_info())
    }
}

pub fn dns_result() -> DnsResult {
    DnsResult {
        a_records: vec!["93.184.215.14".to_string()],
        aaaa_records: Vec::new(),
        ns_records: vec!["a.iana-servers.net".to_string()],
        mx_records: vec!["10 mail.example.com".to_string()],
        txt_records: vec!["v=spf1 -all".to_string()],
        error: None,
    }
}

pub fn certificate_info() -> CertificateInfo {
    CertificateInfo {
        subject: "CN=example.com".to_string(),
        issuer: "CN=Mock CA".to_string(),
        valid_from: 1_700_000_000,
        valid_until: 1_800_000_000,
        serial_number: "0A1B2C".to_string(),
        version: 3,
        error: None,
    }
}

pub fn target_report(target: DiagnosticTarget) -> TargetReport {
    TargetReport {
        target,
        connectivity: ConnectivityResult::unreachable(
            5000,
            &Failure::bare(FailureKind::Refused),
        ),
        dns: dns_result(),
        certificate: certificate_info(),
        started_at: 1_750_000_000,
        elapsed_ms: 42,
    }
}

pub(super) fn build_server(
    engine: Arc<dyn DiagnosticsProvider>,
    timeouts: ToolTimeouts,
) -> NetcheckMcp {
    NetcheckMcp::with_timeouts(engine, timeouts)
}
