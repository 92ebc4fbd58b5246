//! TLS certificate inspection.
//!
//! Runs a handshake in diagnostic mode: any certificate chain is accepted, but
//! handshake signatures are still verified. Only the leaf certificate is
//! reported.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, trace, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;

use super::connectivity::connect_any;
use crate::config::CertificateConfig;
use crate::error::{EngineError, EngineResult};
use crate::types::{CertificateInfo, Failure, FailureKind};

/// Accepts every certificate chain while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the TLS connector shared by all inspections of an engine instance.
pub(crate) fn build_tls_connector() -> EngineResult<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| EngineError::InternalError(format!("Failed to configure TLS client: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// Retrieve and describe the leaf certificate served on `host:port`.
pub(crate) async fn inspect_certificate(
    connector: &TlsConnector,
    host: &str,
    port: u16,
    config: &CertificateConfig,
) -> CertificateInfo {
    debug!("[CERT] Inspecting {host}:{port}");
    let start = Instant::now();
    match fetch_leaf(connector, host, port, config).await {
        Ok(info) => {
            debug!(
                "[CERT] {host}:{port} subject={} issuer={} valid_until={} total_time={:?}",
                info.subject,
                info.issuer,
                info.valid_until,
                start.elapsed()
            );
            info
        }
        Err(failure) => {
            warn!("[CERT] {host}:{port} failed: {failure}");
            CertificateInfo::failed(&failure)
        }
    }
}

async fn fetch_leaf(
    connector: &TlsConnector,
    host: &str,
    port: u16,
    config: &CertificateConfig,
) -> Result<CertificateInfo, Failure> {
    trace!("[CERT] Establishing TCP connection...");
    let stream = timeout(config.connect_timeout(), connect_any(host, port))
        .await
        .map_err(|_| {
            Failure::new(
                FailureKind::Timeout,
                format!(
                    "no connection within {} ms",
                    config.connect_timeout().as_millis()
                ),
            )
        })??;

    let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
        Failure::new(
            FailureKind::TlsHandshake,
            format!("invalid server name {host}: {e}"),
        )
    })?;

    trace!("[CERT] Performing TLS handshake...");
    let tls_stream = match timeout(
        config.handshake_timeout(),
        connector.connect(server_name, stream),
    )
    .await
    {
        Ok(Ok(s)) => s,
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => {
            return Err(Failure::bare(FailureKind::Timeout));
        }
        Ok(Err(e)) => return Err(Failure::new(FailureKind::TlsHandshake, e.to_string())),
        Err(_) => {
            return Err(Failure::new(
                FailureKind::Timeout,
                format!(
                    "no TLS handshake within {} ms",
                    config.handshake_timeout().as_millis()
                ),
            ));
        }
    };

    let (_, tls_conn) = tls_stream.get_ref();
    let leaf = tls_conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| Failure::bare(FailureKind::NoCertificate))?;
    trace!("[CERT] Parsing leaf certificate ({} bytes)", leaf.len());
    parse_leaf(leaf.as_ref())
}

/// Extract the reported fields from a DER-encoded certificate.
pub(crate) fn parse_leaf(der: &[u8]) -> Result<CertificateInfo, Failure> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Failure::new(FailureKind::CertificateParse, e.to_string()))?;

    let valid_from = cert.validity().not_before.timestamp();
    let valid_until = cert.validity().not_after.timestamp();
    if valid_from > valid_until {
        return Err(Failure::new(
            FailureKind::CertificateParse,
            format!("notBefore ({valid_from}) is after notAfter ({valid_until})"),
        ));
    }

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        valid_from,
        valid_until,
        serial_number: cert.serial.to_str_radix(16).to_uppercase(),
        // Stored 0-based in the encoding.
        version: cert.version().0 + 1,
        error: None,
    })
}
