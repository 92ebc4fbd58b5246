//! Network diagnostics engine.
//!
//! 针对每个目标主机并发执行连通性探测、DNS 解析（A/AAAA/NS/MX/TXT）和 TLS 证书检查，
//! 单个检查的失败记录在结果的 `error` 字段中，不会中断整个请求。

mod config;
mod error;
mod services;
mod types;

pub use config::{
    CertificateConfig, DnsConfig, EngineConfig, MAX_PROBE_RETRIES, OrchestratorConfig,
    ProberConfig,
};
pub use error::{EngineError, EngineResult};
pub use services::{DiagnosticsProvider, DiagnosticsService};
pub use types::{
    CertificateInfo, ConnectivityResult, DiagnosticReport, DiagnosticTarget, DnsRecordKind,
    DnsResult, Failure, FailureKind, ProbeProtocol, TargetReport,
};
