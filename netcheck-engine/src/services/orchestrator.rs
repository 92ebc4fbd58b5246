//! Per-target fan-out and cross-target aggregation.
//!
//! The three checks of a target run inside one future via `tokio::join!`, each
//! behind the same deadline. Targets are driven by a buffered stream, so no
//! task outlives a request and dropping the request cancels every check.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use tokio::time::timeout;

use super::elapsed_ms;
use crate::types::{
    CertificateInfo, ConnectivityResult, DiagnosticReport, DiagnosticTarget, DnsResult, Failure,
    FailureKind, TargetReport,
};

/// Run `check` under `deadline`, falling back to `on_timeout` when it is exceeded.
pub(crate) async fn within_deadline<T>(
    name: &str,
    deadline: Duration,
    check: impl Future<Output = T>,
    on_timeout: impl FnOnce(&Failure) -> T,
) -> T {
    if let Ok(result) = timeout(deadline, check).await {
        result
    } else {
        let failure = deadline_failure(name, deadline);
        warn!("[DIAG] {failure}");
        on_timeout(&failure)
    }
}

/// Time reserved between a check's own budget and the target deadline, so
/// the check can hand back what it gathered before the deadline cuts it.
const DEADLINE_HEADROOM: Duration = Duration::from_millis(50);

/// Cap `budget` so a check that assembles partial results finishes inside
/// `deadline`.
pub(crate) fn budget_within(budget: Duration, deadline: Duration) -> Duration {
    budget.min(deadline.saturating_sub(DEADLINE_HEADROOM))
}

fn deadline_failure(name: &str, deadline: Duration) -> Failure {
    Failure::new(
        FailureKind::Timeout,
        format!(
            "{name} exceeded the {} ms target deadline",
            deadline.as_millis()
        ),
    )
}

/// Run the three checks of `target` concurrently and assemble its report.
pub(crate) async fn diagnose_target(
    target: DiagnosticTarget,
    deadline: Duration,
    connectivity: impl Future<Output = ConnectivityResult>,
    dns: impl Future<Output = DnsResult>,
    certificate: impl Future<Output = CertificateInfo>,
) -> TargetReport {
    debug!("[DIAG] Diagnosing {}", target.key());
    let started_at = chrono::Utc::now().timestamp();
    let start = Instant::now();

    let (connectivity, dns, certificate) = tokio::join!(
        within_deadline("connectivity", deadline, connectivity, |failure| {
            ConnectivityResult::unreachable(elapsed_ms(start), failure)
        }),
        within_deadline("dns", deadline, dns, DnsResult::failed),
        within_deadline("certificate", deadline, certificate, CertificateInfo::failed),
    );

    let report = TargetReport {
        target,
        connectivity,
        dns,
        certificate,
        started_at,
        elapsed_ms: elapsed_ms(start),
    };
    debug!(
        "[DIAG] {} done in {}ms: reachable={} dns_error={} cert_error={}",
        report.target.key(),
        report.elapsed_ms,
        report.connectivity.is_reachable,
        report.dns.error.is_some(),
        report.certificate.error.is_some()
    );
    report
}

/// Drop repeated targets, keeping the first occurrence of each.
///
/// Only identical targets collapse; the same host over another protocol or
/// with other port overrides is a separate request.
pub(crate) fn dedupe_targets(targets: Vec<DiagnosticTarget>) -> Vec<DiagnosticTarget> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// Diagnose `targets` with at most `max_concurrent` in flight.
pub(crate) async fn run_all<F, Fut>(
    targets: Vec<DiagnosticTarget>,
    max_concurrent: usize,
    diagnose: F,
) -> DiagnosticReport
where
    F: Fn(DiagnosticTarget) -> Fut,
    Fut: Future<Output = TargetReport>,
{
    let start = Instant::now();
    let count = targets.len();
    debug!("[DIAG] Running {count} target(s), up to {max_concurrent} at a time");

    let reports: Vec<TargetReport> = stream::iter(targets)
        .map(diagnose)
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;

    let targets: BTreeMap<String, TargetReport> = reports
        .into_iter()
        .map(|report| (report.target.key(), report))
        .collect();

    let report = DiagnosticReport {
        targets,
        total_time_ms: elapsed_ms(start),
    };
    debug!(
        "[DIAG] {count} target(s) finished in {}ms",
        report.total_time_ms
    );
    report
}
