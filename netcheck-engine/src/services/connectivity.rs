//! Reachability probing.
//!
//! A probe either opens a TCP connection or issues an HTTP(S) GET. Any HTTP
//! status counts as reachable unless `require_success_status` is set, in which
//! case statuses outside 200-399 are reported as unreachable while keeping the
//! status code.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use reqwest::Client;
use tokio::net::{TcpStream, lookup_host};
use tokio::time::{sleep, timeout};

use super::elapsed_ms;
use crate::config::{MAX_PROBE_RETRIES, ProberConfig};
use crate::error::{EngineError, EngineResult};
use crate::types::{ConnectivityResult, Failure, FailureKind, ProbeProtocol};

const REDIRECT_LIMIT: usize = 5;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Build the HTTP client shared by all probes of an engine instance.
///
/// Certificates are not verified here: trust is reported by the certificate
/// inspector, and a probe only answers whether the service responds.
pub(crate) fn build_http_client(config: &ProberConfig) -> EngineResult<Client> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.timeout())
        .redirect(reqwest::redirect::Policy::limited(REDIRECT_LIMIT))
        .danger_accept_invalid_certs(true)
        .user_agent(concat!("netcheck/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::InternalError(format!("Failed to build HTTP client: {e}")))
}

/// Probe `host:port` and report whether it is reachable.
pub(crate) async fn check_connectivity(
    client: &Client,
    host: &str,
    port: u16,
    protocol: ProbeProtocol,
    config: &ProberConfig,
) -> ConnectivityResult {
    debug!("[PROBE] Probing {host}:{port} over {protocol}");
    let start = Instant::now();
    let retries = config.retries.min(MAX_PROBE_RETRIES);
    let mut attempt = 0;

    loop {
        let attempt_start = Instant::now();
        let outcome = match protocol {
            ProbeProtocol::Tcp => tcp_probe(host, port, config.timeout()).await,
            ProbeProtocol::Http | ProbeProtocol::Https => {
                http_probe(client, host, port, protocol, config.timeout()).await
            }
        };

        match outcome {
            Ok(status_code) => {
                let result =
                    evaluate_status(elapsed_ms(attempt_start), status_code, config);
                debug!(
                    "[PROBE] {host}:{port} reachable={} status={:?} time={}ms",
                    result.is_reachable, result.status_code, result.response_time_ms
                );
                return result;
            }
            Err(failure) if failure.kind.is_transient() && attempt < retries => {
                attempt += 1;
                warn!("[PROBE] {host}:{port} attempt {attempt} failed ({failure}), retrying");
                sleep(RETRY_BACKOFF * attempt).await;
            }
            Err(failure) => {
                warn!("[PROBE] {host}:{port} unreachable: {failure}");
                return ConnectivityResult::unreachable(elapsed_ms(start), &failure);
            }
        }
    }
}

/// Apply the status policy to a completed probe.
pub(crate) fn evaluate_status(
    response_time_ms: u64,
    status_code: Option<u16>,
    config: &ProberConfig,
) -> ConnectivityResult {
    match status_code {
        Some(code) if config.require_success_status && !(200..400).contains(&code) => {
            ConnectivityResult {
                is_reachable: false,
                response_time_ms,
                status_code: Some(code),
                error: Some(Failure::new(FailureKind::HttpStatus, code.to_string()).to_string()),
            }
        }
        _ => ConnectivityResult::reachable(response_time_ms, status_code),
    }
}

/// Resolve `host` and connect to each address in turn until one accepts.
///
/// The last connection error wins when every address fails.
pub(crate) async fn connect_any(host: &str, port: u16) -> Result<TcpStream, Failure> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| Failure::new(FailureKind::Resolution, e.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(Failure::new(
            FailureKind::Resolution,
            format!("no addresses found for {host}"),
        ));
    }

    let mut last_failure = None;
    for addr in addrs {
        trace!("Connecting to {addr}");
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                trace!("{addr} failed: {e}");
                last_failure = Some(Failure::from_io(&e));
            }
        }
    }
    Err(last_failure.unwrap_or_else(|| Failure::bare(FailureKind::Transport)))
}

async fn tcp_probe(host: &str, port: u16, limit: Duration) -> Result<Option<u16>, Failure> {
    match timeout(limit, connect_any(host, port)).await {
        Ok(Ok(_stream)) => Ok(None),
        Ok(Err(failure)) => Err(failure),
        Err(_) => Err(Failure::new(
            FailureKind::Timeout,
            format!("no connection within {} ms", limit.as_millis()),
        )),
    }
}

async fn http_probe(
    client: &Client,
    host: &str,
    port: u16,
    protocol: ProbeProtocol,
    limit: Duration,
) -> Result<Option<u16>, Failure> {
    let url = probe_url(host, port, protocol);
    trace!("[PROBE] GET {url}");
    let response = client
        .get(&url)
        .timeout(limit)
        .send()
        .await
        .map_err(|e| classify_http_error(&e, limit))?;
    Ok(Some(response.status().as_u16()))
}

pub(crate) fn probe_url(host: &str, port: u16, protocol: ProbeProtocol) -> String {
    let scheme = if protocol == ProbeProtocol::Http {
        "http"
    } else {
        "https"
    };
    if host.parse::<std::net::Ipv6Addr>().is_ok() {
        format!("{scheme}://[{host}]:{port}/")
    } else {
        format!("{scheme}://{host}:{port}/")
    }
}

/// Classify a request failure by walking its source chain.
fn classify_http_error(err: &reqwest::Error, limit: Duration) -> Failure {
    if err.is_timeout() {
        return Failure::new(
            FailureKind::Timeout,
            format!("no response within {} ms", limit.as_millis()),
        );
    }

    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            // The TLS stack reports handshake failures as io errors wrapping
            // the rustls error, and `io::Error::source` skips that layer.
            if let Some(tls) = io
                .get_ref()
                .and_then(|inner| inner.downcast_ref::<rustls::Error>())
            {
                return Failure::new(FailureKind::TlsHandshake, tls.to_string());
            }
            if io.kind() == std::io::ErrorKind::TimedOut {
                return Failure::new(
                    FailureKind::Timeout,
                    format!("no response within {} ms", limit.as_millis()),
                );
            }
            return Failure::from_io(io);
        }
        if cause.downcast_ref::<rustls::Error>().is_some() {
            return Failure::new(FailureKind::TlsHandshake, cause.to_string());
        }
        if cause.to_string().starts_with("dns error") {
            return Failure::new(FailureKind::Resolution, cause.to_string());
        }
        source = cause.source();
    }

    Failure::new(FailureKind::Transport, error_chain(err))
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(timeout_ms: u64) -> ProberConfig {
        ProberConfig {
            timeout_ms,
            ..ProberConfig::default()
        }
    }

    /// A port on loopback that nothing listens on.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    /// Serve `response` to every connection after reading the request head.
    async fn http_server(response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        port
    }

    // ==================== status policy tests ====================

    #[test]
    fn test_evaluate_status_non_2xx_is_reachable_by_default() {
        let result = evaluate_status(10, Some(503), &ProberConfig::default());
        assert!(result.is_reachable);
        assert_eq!(result.status_code, Some(503));
        assert!(result.error.is_none());
    }

    #[test]
    fn test_evaluate_status_strict_policy_keeps_status_and_error() {
        let strict = ProberConfig {
            require_success_status: true,
            ..ProberConfig::default()
        };
        let result = evaluate_status(10, Some(503), &strict);
        assert!(!result.is_reachable);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(result.failure_kind(), Some(FailureKind::HttpStatus));
        assert_eq!(result.error.as_deref(), Some("unexpected http status: 503"));

        let redirect = evaluate_status(10, Some(301), &strict);
        assert!(redirect.is_reachable);
    }

    #[test]
    fn test_evaluate_status_tcp_has_no_status() {
        let strict = ProberConfig {
            require_success_status: true,
            ..ProberConfig::default()
        };
        let result = evaluate_status(4, None, &strict);
        assert!(result.is_reachable);
        assert!(result.status_code.is_none());
    }

    #[test]
    fn test_probe_url_brackets_ipv6() {
        assert_eq!(
            probe_url("::1", 8443, ProbeProtocol::Https),
            "https://[::1]:8443/"
        );
        assert_eq!(
            probe_url("example.com", 80, ProbeProtocol::Http),
            "http://example.com:80/"
        );
    }

    // ==================== TCP probe tests ====================

    #[tokio::test]
    async fn test_tcp_probe_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Tcp, &config(2000)).await;
        assert!(result.is_reachable);
        assert!(result.error.is_none());
        assert!(result.status_code.is_none());
        drop(listener);
    }

    #[tokio::test]
    async fn test_tcp_probe_localhost_refused() {
        let port = closed_port().await;
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "localhost", port, ProbeProtocol::Tcp, &config(2000)).await;
        assert!(!result.is_reachable);
        assert_eq!(result.error.as_deref(), Some("connection refused"));
        assert!(result.response_time_ms < 2000);
    }

    #[tokio::test]
    async fn test_tcp_probe_refusal_is_not_retried() {
        let port = closed_port().await;
        let client = build_http_client(&ProberConfig::default()).unwrap();
        let retrying = ProberConfig {
            retries: 3,
            ..config(2000)
        };

        let start = Instant::now();
        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Tcp, &retrying).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Refused));
        // Three back-offs would add at least 600 ms.
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_tcp_probe_unresolvable_host() {
        let client = build_http_client(&ProberConfig::default()).unwrap();
        let result = check_connectivity(
            &client,
            "does-not-exist.invalid",
            80,
            ProbeProtocol::Tcp,
            &config(5000),
        )
        .await;
        assert!(!result.is_reachable);
        assert_eq!(result.failure_kind(), Some(FailureKind::Resolution));
    }

    // ==================== HTTP probe tests ====================

    #[tokio::test]
    async fn test_http_probe_reports_status() {
        let port = http_server("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n").await;
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Http, &config(2000)).await;
        assert!(result.is_reachable);
        assert_eq!(result.status_code, Some(204));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_http_probe_server_error_counts_as_reachable() {
        let port = http_server(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Http, &config(2000)).await;
        assert!(result.is_reachable);
        assert_eq!(result.status_code, Some(503));

        let strict = ProberConfig {
            require_success_status: true,
            ..config(2000)
        };
        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Http, &strict).await;
        assert!(!result.is_reachable);
        assert_eq!(result.status_code, Some(503));
        assert_eq!(result.failure_kind(), Some(FailureKind::HttpStatus));
    }

    #[tokio::test]
    async fn test_http_probe_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let holder = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Http, &config(200)).await;
        assert!(!result.is_reachable);
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
        assert!(result.response_time_ms >= 150);
        holder.abort();
    }

    #[tokio::test]
    async fn test_http_probe_refused() {
        let port = closed_port().await;
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Http, &config(2000)).await;
        assert!(!result.is_reachable);
        assert_eq!(result.failure_kind(), Some(FailureKind::Refused));
    }

    #[tokio::test]
    async fn test_https_probe_plaintext_port_is_handshake_failure() {
        let port = http_server("HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n").await;
        let client = build_http_client(&ProberConfig::default()).unwrap();

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Https, &config(2000))
                .await;
        assert!(!result.is_reachable);
        assert_eq!(
            result.failure_kind(),
            Some(FailureKind::TlsHandshake),
            "unexpected error: {:?}",
            result.error
        );
        assert!(result.status_code.is_none());
    }

    #[tokio::test]
    async fn test_http_probe_retries_transient_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // First connection is dropped without a response.
            if let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                let _ = stream.shutdown().await;
            }
        });
        let client = build_http_client(&ProberConfig::default()).unwrap();
        let retrying = ProberConfig {
            retries: 2,
            ..config(2000)
        };

        let result =
            check_connectivity(&client, "127.0.0.1", port, ProbeProtocol::Http, &retrying).await;
        assert!(result.is_reachable, "unexpected failure: {:?}", result.error);
        assert_eq!(result.status_code, Some(200));
    }

    // ==================== integration tests ====================

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_https_probe_real() {
        let client = build_http_client(&ProberConfig::default()).unwrap();
        let result = check_connectivity(
            &client,
            "example.com",
            443,
            ProbeProtocol::Https,
            &ProberConfig::default(),
        )
        .await;
        assert!(result.is_reachable, "unexpected failure: {:?}", result.error);
        assert!(result.status_code.is_some());
    }
}
