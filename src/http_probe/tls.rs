use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, ProtocolVersion, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;
use x509_parser::parse_x509_certificate;

use crate::probe::ProbeError;

/// What the handshake negotiated, reported alongside the phase timings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsSummary {
    pub version: Option<String>,
    pub alpn: Option<String>,
    pub cert_expiry_days: Option<i64>,
}

impl TlsSummary {
    pub fn from_connection(conn: &ClientConnection) -> Self {
        let version = conn.protocol_version().map(|v| match v {
            ProtocolVersion::TLSv1_2 => "TLS 1.2".to_string(),
            ProtocolVersion::TLSv1_3 => "TLS 1.3".to_string(),
            other => format!("{other:?}"),
        });
        let alpn = conn
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned());
        let cert_expiry_days = conn
            .peer_certificates()
            .and_then(|chain| chain.first())
            .and_then(|leaf| cert_expiry_days(leaf.as_ref()));

        TlsSummary {
            version,
            alpn,
            cert_expiry_days,
        }
    }

    pub fn negotiated_h2(&self) -> bool {
        self.alpn.as_deref() == Some("h2")
    }
}

/// Days until the certificate's `notAfter`, negative once expired.
pub fn cert_expiry_days(der: &[u8]) -> Option<i64> {
    let (_, parsed) = parse_x509_certificate(der).ok()?;

    let not_after = parsed.validity().not_after.timestamp();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs() as i64;

    Some((not_after - now) / 86400)
}

/// A connector offering h2 and http/1.1 over ALPN.
///
/// With `insecure` set the server certificate is not validated, only the
/// handshake signatures are.
pub fn connector(insecure: bool) -> Result<TlsConnector, ProbeError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(ProbeError::build)?;

    let mut config = if insecure {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    } else {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}

pub fn server_name(host: &str) -> Result<ServerName<'static>, ProbeError> {
    ServerName::try_from(host.to_string())
        .map_err(|e| ProbeError::build(format!("invalid TLS server name '{host}': {e}")))
}

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
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
