use crate::error::{ProbeError, ProbeOutcome};
use crate::state::CertificateExpiry;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, SignatureScheme};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

const SECONDS_PER_DAY: i64 = 86_400;

/// Reads the peer certificate of `host:port` and reports how long it stays valid.
///
/// The chain is never validated; only `notAfter` matters. A TLS protocol
/// failure is itself the finding and comes back as `Ok` with zero days.
pub async fn inspect(host: &str, port: u16, timeout: Duration) -> ProbeOutcome<CertificateExpiry> {
    inspect_at(host, port, timeout, Utc::now()).await
}

pub async fn inspect_at(
    host: &str,
    port: u16,
    timeout: Duration,
    now: DateTime<Utc>,
) -> ProbeOutcome<CertificateExpiry> {
    let config = client_config()?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|err| ProbeError::config(format!("invalid host name {host}: {err}")))?;

    let der = match handshake(host, port, timeout, config.clone(), server_name.clone()).await {
        Ok(der) => der,
        Err(Handshake::Tls(err)) => {
            warn!(host, port, error = %err, "tls handshake rejected");
            return Ok(tls_failure(&err.to_string()));
        }
        Err(Handshake::Failed(err)) => return Err(err),
        Err(Handshake::Connection(err)) => {
            debug!(host, port, error = %err, "handshake aborted, capturing certificate directly");
            time::timeout(timeout, capture(host, port, config, server_name))
                .await
                .map_err(|_| ProbeError::transport(format!("{host}:{port}: certificate capture timed out")))??
        }
    };

    match not_after(&der) {
        Ok(not_after) => Ok(expiry(not_after, now)),
        Err(reason) => Ok(tls_failure(&reason)),
    }
}

enum Handshake {
    /// The peer spoke TLS but the exchange or its certificate was invalid.
    Tls(rustls::Error),
    /// The connection dropped below the TLS layer.
    Connection(io::Error),
    Failed(ProbeError),
}

async fn handshake(
    host: &str,
    port: u16,
    timeout: Duration,
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
) -> Result<Vec<u8>, Handshake> {
    let stream = connect(host, port, timeout).await.map_err(Handshake::Failed)?;
    let connector = TlsConnector::from(config);

    let tls = match time::timeout(timeout, connector.connect(server_name, stream)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(err)) => return Err(classify(err)),
        Err(_elapsed) => {
            return Err(Handshake::Failed(ProbeError::transport(format!(
                "{host}:{port}: TLS handshake timed out"
            ))))
        }
    };

    let (_, session) = tls.get_ref();
    session
        .peer_certificates()
        .and_then(|chain| chain.first())
        .map(|cert| cert.as_ref().to_vec())
        .ok_or_else(|| Handshake::Failed(ProbeError::protocol("SSL: no peer certificate")))
}

fn classify(err: io::Error) -> Handshake {
    let is_tls = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        .is_some();
    if is_tls {
        match err.into_inner().map(|inner| inner.downcast::<rustls::Error>()) {
            Some(Ok(tls)) => Handshake::Tls(*tls),
            _ => Handshake::Failed(ProbeError::protocol("SSL: handshake failed")),
        }
    } else {
        Handshake::Connection(err)
    }
}

/// Drives a handshake by hand just far enough to see the server certificate,
/// tolerating peers that drop the connection before the handshake completes.
async fn capture(
    host: &str,
    port: u16,
    config: Arc<ClientConfig>,
    server_name: ServerName<'static>,
) -> ProbeOutcome<Vec<u8>> {
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|err| ProbeError::transport(format!("{host}:{port}: {err}")))?;
    let mut conn = ClientConnection::new(config, server_name)
        .map_err(|err| ProbeError::protocol(format!("SSL: {err}")))?;

    let mut buf = vec![0_u8; 16 * 1024];
    loop {
        if let Some(cert) = conn.peer_certificates().and_then(|chain| chain.first()) {
            return Ok(cert.as_ref().to_vec());
        }

        while conn.wants_write() {
            let mut out = Vec::new();
            conn.write_tls(&mut out)
                .map_err(|err| ProbeError::transport(err.to_string()))?;
            // The peer may already be gone; whatever it sent is still readable.
            if stream.write_all(&out).await.is_err() {
                break;
            }
        }

        let n = stream
            .read(&mut buf)
            .await
            .map_err(|err| ProbeError::transport(format!("{host}:{port}: {err}")))?;
        if n == 0 {
            return Err(ProbeError::transport(format!(
                "{host}:{port}: connection closed before a certificate was sent"
            )));
        }

        let mut received = &buf[..n];
        while !received.is_empty() {
            conn.read_tls(&mut received)
                .map_err(|err| ProbeError::transport(err.to_string()))?;
            conn.process_new_packets()
                .map_err(|err| ProbeError::protocol(format!("SSL: {err}")))?;
        }
    }
}

async fn connect(host: &str, port: u16, timeout: Duration) -> ProbeOutcome<TcpStream> {
    match time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(err)) => Err(ProbeError::transport(format!("{host}:{port}: {err}"))),
        Err(_elapsed) => Err(ProbeError::transport(format!("{host}:{port}: connection timed out"))),
    }
}

fn not_after(der: &[u8]) -> Result<i64, String> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|err| format!("malformed certificate: {err}"))?;
    Ok(cert.validity().not_after.timestamp())
}

fn expiry(not_after: i64, now: DateTime<Utc>) -> CertificateExpiry {
    let delta = now.timestamp() - not_after;
    let days = delta.div_euclid(SECONDS_PER_DAY);
    if delta > 0 {
        CertificateExpiry {
            days_remaining: days.abs(),
            expired: true,
            message: format!("Certificate expired {days} days ago"),
        }
    } else {
        CertificateExpiry {
            days_remaining: days.abs(),
            expired: false,
            message: format!("Days remaining before expiration: {}", days.abs()),
        }
    }
}

fn tls_failure(reason: &str) -> CertificateExpiry {
    CertificateExpiry {
        days_remaining: 0,
        expired: false,
        message: format!("SSL: {reason}"),
    }
}

fn client_config() -> ProbeOutcome<Arc<ClientConfig>> {
    let provider = Arc::new(ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|err| ProbeError::protocol(format!("SSL: {err}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Accepts any chain and name; handshake signatures are still checked.
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
