//! DNS 查询模块
//!
//! Resolves the five record types of a target concurrently. Each lookup has its
//! own timeout, capped by the overall deadline, so a slow record type never
//! holds back the others.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use futures::future::join_all;
use hickory_resolver::{ResolveError, TokioResolver, proto::ProtoErrorKind};
use log::{debug, trace, warn};
use tokio::time::timeout;

use crate::types::{DnsRecordKind, DnsResult, Failure, FailureKind};

/// What a single record-type lookup produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LookupOutcome {
    /// The server answered; the list may be empty (NODATA).
    Answered(Vec<String>),
    /// The name does not exist at all.
    NxDomain,
    TimedOut,
    Failed(String),
}

impl LookupOutcome {
    fn from_error(err: &ResolveError) -> Self {
        if err.is_nx_domain() {
            return Self::NxDomain;
        }
        if err.is_no_records_found() {
            return Self::Answered(Vec::new());
        }
        if err
            .proto()
            .is_some_and(|proto| matches!(proto.kind(), ProtoErrorKind::Timeout))
        {
            return Self::TimedOut;
        }
        Self::Failed(err.to_string())
    }
}

/// Resolve every record kind of `host`, giving each lookup at most `budget`.
///
/// All lookups start together, so `budget` also bounds the whole set. Lookups
/// still pending when it runs out count as timed out while the answers that
/// did arrive are kept.
pub(crate) async fn check_dns(
    resolver: &TokioResolver,
    host: &str,
    budget: Duration,
) -> DnsResult {
    if let Ok(ip) = host.parse::<IpAddr>() {
        trace!("[DNS] {host} is an IP literal, skipping resolution");
        return literal_result(ip);
    }

    debug!("[DNS] Resolving {host} (budget {} ms)", budget.as_millis());
    let start = Instant::now();

    let lookups = DnsRecordKind::ALL.into_iter().map(|kind| async move {
        let outcome = match timeout(budget, lookup(resolver, host, kind)).await {
            Ok(Ok(records)) => LookupOutcome::Answered(records),
            Ok(Err(e)) => LookupOutcome::from_error(&e),
            Err(_) => LookupOutcome::TimedOut,
        };
        trace!("[DNS] {kind} lookup for {host}: {outcome:?}");
        (kind, outcome)
    });
    let outcomes = join_all(lookups).await;

    let result = assemble(host, outcomes, budget.as_millis());
    debug!(
        "[DNS] {host} resolved in {:?}: A={} AAAA={} NS={} MX={} TXT={} error={:?}",
        start.elapsed(),
        result.a_records.len(),
        result.aaaa_records.len(),
        result.ns_records.len(),
        result.mx_records.len(),
        result.txt_records.len(),
        result.error
    );
    result
}

fn literal_result(ip: IpAddr) -> DnsResult {
    let mut result = DnsResult::default();
    let kind = if ip.is_ipv4() {
        DnsRecordKind::A
    } else {
        DnsRecordKind::Aaaa
    };
    result.records_mut(kind).push(ip.to_string());
    result
}

/// Combine per-kind outcomes into a [`DnsResult`].
///
/// The top-level error is only set when the name does not exist or when not a
/// single lookup got an answer.
pub(crate) fn assemble(
    host: &str,
    outcomes: Vec<(DnsRecordKind, LookupOutcome)>,
    budget_ms: u128,
) -> DnsResult {
    if outcomes
        .iter()
        .any(|(_, outcome)| *outcome == LookupOutcome::NxDomain)
    {
        return DnsResult::failed(&Failure::new(
            FailureKind::Resolution,
            format!("{host} does not exist (NXDOMAIN)"),
        ));
    }

    let answered = outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, LookupOutcome::Answered(_)));
    if !answered {
        let any_timeout = outcomes
            .iter()
            .any(|(_, outcome)| *outcome == LookupOutcome::TimedOut);
        if any_timeout || outcomes.is_empty() {
            return DnsResult::failed(&Failure::new(
                FailureKind::Timeout,
                format!("no DNS answer for {host} within {budget_ms} ms"),
            ));
        }
        let detail = outcomes
            .iter()
            .find_map(|(_, outcome)| match outcome {
                LookupOutcome::Failed(msg) => Some(msg.clone()),
                _ => None,
            })
            .unwrap_or_default();
        return DnsResult::failed(&Failure::new(FailureKind::Transport, detail));
    }

    let mut result = DnsResult::default();
    for (kind, outcome) in outcomes {
        match outcome {
            LookupOutcome::Answered(records) => *result.records_mut(kind) = records,
            LookupOutcome::TimedOut => warn!("[DNS] {kind} lookup for {host} timed out"),
            LookupOutcome::Failed(msg) => warn!("[DNS] {kind} lookup for {host} failed: {msg}"),
            LookupOutcome::NxDomain => {}
        }
    }
    result
}

async fn lookup(
    resolver: &TokioResolver,
    host: &str,
    kind: DnsRecordKind,
) -> Result<Vec<String>, ResolveError> {
    let records = match kind {
        DnsRecordKind::A => resolver
            .ipv4_lookup(host)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect(),
        DnsRecordKind::Aaaa => resolver
            .ipv6_lookup(host)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect(),
        DnsRecordKind::Ns => resolver
            .ns_lookup(host)
            .await?
            .iter()
            .map(|ns| trim_root(&ns.to_string()))
            .collect(),
        DnsRecordKind::Mx => resolver
            .mx_lookup(host)
            .await?
            .iter()
            .map(|mx| format!("{} {}", mx.preference(), trim_root(&mx.exchange().to_string())))
            .collect(),
        DnsRecordKind::Txt => resolver
            .txt_lookup(host)
            .await?
            .iter()
            .map(|txt| {
                txt.iter()
                    .map(|data| String::from_utf8_lossy(data).into_owned())
                    .collect::<String>()
            })
            .collect(),
    };
    Ok(records)
}

fn trim_root(name: &str) -> String {
    name.trim_end_matches('.').to_string()
}
