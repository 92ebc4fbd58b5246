//! MCP Server implementation for netcheck.
//!
//! Exposes 4 tools that run the engine's network diagnostics.

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tokio::time::{Duration, timeout};

use netcheck_engine::{
    DiagnosticTarget, DiagnosticsProvider, EngineError, EngineResult, ProbeProtocol,
};

use crate::schemas::{
    CheckConnectivityParams, CheckDnsParams, GetCertificateInfoParams, RunDiagnosticsParams,
};

// Timeout constants for engine calls
const RUN_DIAGNOSTICS_TIMEOUT_SECS: u64 = 120;
const CHECK_CONNECTIVITY_TIMEOUT_SECS: u64 = 30;
const CHECK_DNS_TIMEOUT_SECS: u64 = 30;
const CERTIFICATE_TIMEOUT_SECS: u64 = 30;

/// Maximum number of targets accepted by one `run_diagnostics` call.
const MAX_TARGETS: usize = 50;

#[derive(Clone, Copy)]
struct ToolTimeouts {
    run_diagnostics: Duration,
    check_connectivity: Duration,
    check_dns: Duration,
    get_certificate_info: Duration,
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            run_diagnostics: Duration::from_secs(RUN_DIAGNOSTICS_TIMEOUT_SECS),
            check_connectivity: Duration::from_secs(CHECK_CONNECTIVITY_TIMEOUT_SECS),
            check_dns: Duration::from_secs(CHECK_DNS_TIMEOUT_SECS),
            get_certificate_info: Duration::from_secs(CERTIFICATE_TIMEOUT_SECS),
        }
    }
}

/// Sanitize error messages to prevent sensitive information leakage.
///
/// Logs the full error to stderr but returns a generic message to the client.
fn sanitize_internal_error(error: impl std::fmt::Display, context: &str) -> McpError {
    log::error!("{context} error: {error}");
    McpError::internal_error(
        format!("{context} failed - check server logs for details"),
        None,
    )
}

/// Validation errors go back to the client verbatim; anything else is sanitized.
fn map_engine_error(context: &str, error: &EngineError) -> McpError {
    if error.is_expected() {
        log::warn!("{context} rejected: {error}");
        McpError::invalid_params(error.to_string(), None)
    } else {
        sanitize_internal_error(error, context)
    }
}

fn parse_protocol(protocol: Option<&str>) -> Result<Option<ProbeProtocol>, McpError> {
    protocol
        .map(|p| p.parse::<ProbeProtocol>())
        .transpose()
        .map_err(|e| McpError::invalid_params(e, None))
}

fn parse_targets(
    targets: &[String],
    protocol: Option<ProbeProtocol>,
) -> Result<Vec<DiagnosticTarget>, McpError> {
    if targets.len() > MAX_TARGETS {
        return Err(McpError::invalid_params(
            format!(
                "Too many targets: {} (maximum is {MAX_TARGETS})",
                targets.len()
            ),
            None,
        ));
    }
    targets
        .iter()
        .map(|raw| {
            let target = raw
                .parse::<DiagnosticTarget>()
                .map_err(|e| McpError::invalid_params(e, None))?;
            Ok(match protocol {
                Some(protocol) => target.with_protocol(protocol),
                None => target,
            })
        })
        .collect()
}

/// Execute an engine operation with timeout, error mapping, and JSON serialization.
async fn run_tool<T: serde::Serialize>(
    duration: Duration,
    future: impl std::future::Future<Output = EngineResult<T>>,
    tool_name: &str,
) -> Result<CallToolResult, McpError> {
    let result = timeout(duration, future)
        .await
        .map_err(|_| McpError::internal_error(format!("{tool_name} timeout"), None))?
        .map_err(|e| map_engine_error(tool_name, &e))?;

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| sanitize_internal_error(e, &format!("Serialize {tool_name} result")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// MCP Server for netcheck.
///
/// Lets local clients run network diagnostics through the Model Context
/// Protocol.
#[derive(Clone)]
pub struct NetcheckMcp {
    /// Diagnostics engine.
    engine: Arc<dyn DiagnosticsProvider>,
    /// Timeout configuration for engine calls.
    timeouts: ToolTimeouts,
    /// Tool router generated by macro.
    tool_router: ToolRouter<Self>,
}

impl NetcheckMcp {
    /// Create a new MCP server instance.
    #[must_use]
    pub fn new(engine: Arc<dyn DiagnosticsProvider>) -> Self {
        Self::with_timeouts(engine, ToolTimeouts::default())
    }

    fn with_timeouts(engine: Arc<dyn DiagnosticsProvider>, timeouts: ToolTimeouts) -> Self {
        Self {
            engine,
            timeouts,
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl NetcheckMcp {
    /// Run all diagnostics for one or more targets.
    #[tool(
        description = "Run connectivity, DNS (A, AAAA, NS, MX, TXT) and TLS certificate checks concurrently for one or more targets"
    )]
    async fn run_diagnostics(
        &self,
        Parameters(params): Parameters<RunDiagnosticsParams>,
    ) -> Result<CallToolResult, McpError> {
        let protocol = parse_protocol(params.protocol.as_deref())?;
        let targets = parse_targets(&params.targets, protocol)?;

        run_tool(
            self.timeouts.run_diagnostics,
            self.engine.run_diagnostics(&targets),
            "Run diagnostics",
        )
        .await
    }

    /// Probe reachability of a host.
    #[tool(
        description = "Check whether a host is reachable over tcp, http or https and measure the response time"
    )]
    async fn check_connectivity(
        &self,
        Parameters(params): Parameters<CheckConnectivityParams>,
    ) -> Result<CallToolResult, McpError> {
        let protocol = parse_protocol(params.protocol.as_deref())?;

        run_tool(
            self.timeouts.check_connectivity,
            self.engine
                .check_connectivity(&params.host, params.port, protocol),
            "Connectivity check",
        )
        .await
    }

    /// Resolve DNS records of a host.
    #[tool(description = "Resolve the A, AAAA, NS, MX and TXT records of a host")]
    async fn check_dns(
        &self,
        Parameters(params): Parameters<CheckDnsParams>,
    ) -> Result<CallToolResult, McpError> {
        run_tool(
            self.timeouts.check_dns,
            self.engine.check_dns(&params.host),
            "DNS check",
        )
        .await
    }

    /// Inspect the TLS certificate of a host.
    #[tool(
        description = "Retrieve the leaf TLS certificate of a host (subject, issuer, validity window, serial number, version); untrusted and expired certificates are still reported"
    )]
    async fn get_certificate_info(
        &self,
        Parameters(params): Parameters<GetCertificateInfoParams>,
    ) -> Result<CallToolResult, McpError> {
        run_tool(
            self.timeouts.get_certificate_info,
            self.engine.get_certificate_info(&params.host, params.port),
            "Certificate check",
        )
        .await
    }
}

#[tool_handler]
impl ServerHandler for NetcheckMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "netcheck MCP Server - Network diagnostics for hosts. \
                 Use run_diagnostics to check several targets at once, or the individual \
                 tools (check_connectivity, check_dns, get_certificate_info) for a single check. \
                 Failures of individual checks are reported in each result's error field."
                    .into(),
            ),
        }
    }
}

#[cfg(test)]
#[path = "test_mocks.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
pub(crate) mod test_mocks;

#[cfg(test)]
#[path = "server_tests.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests;

#[cfg(test)]
#[path = "client_integration_tests.rs"]
#[allow(clippy::unwrap_used, clippy::panic)]
mod client_integration_tests;
