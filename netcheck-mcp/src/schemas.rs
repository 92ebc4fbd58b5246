//! MCP tool parameter schemas
//!
//! Defines the input parameter structures for all MCP tools.
//! All structs derive `Debug`, `Deserialize`, and `JsonSchema` as required by rmcp.

use schemars::JsonSchema;
use serde::Deserialize;

/// Parameters for `run_diagnostics` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunDiagnosticsParams {
    /// Targets to diagnose.
    #[schemars(
        description = "Targets to diagnose: \"host\", \"host:port\" or \"[ipv6]:port\" (at most 50)"
    )]
    pub targets: Vec<String>,

    /// Probe protocol applied to every target.
    #[schemars(description = "Connectivity probe protocol: tcp, http or https (default: https)")]
    pub protocol: Option<String>,
}

/// Parameters for `check_connectivity` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckConnectivityParams {
    /// Host name or IP address to probe.
    #[schemars(description = "Host name or IP address to probe")]
    pub host: String,

    /// Port to probe.
    #[schemars(description = "Port to probe (default: 80 for http, 443 otherwise)")]
    pub port: Option<u16>,

    /// Probe protocol.
    #[schemars(description = "Probe protocol: tcp, http or https (default: https)")]
    pub protocol: Option<String>,
}

/// Parameters for `check_dns` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CheckDnsParams {
    /// Host name to resolve.
    #[schemars(description = "Host name to resolve (A, AAAA, NS, MX and TXT records)")]
    pub host: String,
}

/// Parameters for `get_certificate_info` tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetCertificateInfoParams {
    /// Host serving the certificate.
    #[schemars(description = "Host name or IP address serving the certificate")]
    pub host: String,

    /// TLS port.
    #[schemars(description = "TLS port (default: 443)")]
    pub port: Option<u16>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use schemars::schema_for;

    fn required_fields(schema: &serde_json::Value) -> Vec<String> {
        schema
            .get("required")
            .and_then(serde_json::Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|v| v.as_str().map(ToString::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn run_diagnostics_protocol_is_optional() {
        let params: RunDiagnosticsParams = serde_json::from_value(serde_json::json!({
            "targets": ["example.com", "example.org:8443"]
        }))
        .unwrap();
        assert_eq!(params.targets.len(), 2);
        assert!(params.protocol.is_none());
    }

    #[test]
    fn run_diagnostics_missing_targets_fails() {
        let result: serde_json::Result<RunDiagnosticsParams> =
            serde_json::from_value(serde_json::json!({ "protocol": "tcp" }));
        assert!(result.is_err());
    }

    #[test]
    fn check_connectivity_rejects_out_of_range_port() {
        let result: serde_json::Result<CheckConnectivityParams> =
            serde_json::from_value(serde_json::json!({ "host": "example.com", "port": 70000 }));
        assert!(result.is_err());
    }

    #[test]
    fn get_certificate_info_port_is_optional() {
        let params: GetCertificateInfoParams =
            serde_json::from_value(serde_json::json!({ "host": "example.com" })).unwrap();
        assert_eq!(params.host, "example.com");
        assert!(params.port.is_none());
    }

    #[test]
    fn schema_marks_required_fields() {
        let run = serde_json::to_value(schema_for!(RunDiagnosticsParams)).unwrap();
        assert_eq!(required_fields(&run), vec!["targets"]);

        let probe = serde_json::to_value(schema_for!(CheckConnectivityParams)).unwrap();
        let required = required_fields(&probe);
        assert!(required.contains(&"host".to_string()));
        assert!(!required.contains(&"port".to_string()));
        assert!(!required.contains(&"protocol".to_string()));

        let dns = serde_json::to_value(schema_for!(CheckDnsParams)).unwrap();
        assert_eq!(required_fields(&dns), vec!["host"]);
    }
}
