//! Transport security for pooled Postgres connections.
//!
//! `Require` encrypts without checking the server certificate, which is what
//! managed Postgres offerings with self-signed chains need. `Verify` checks the
//! chain against an operator-supplied CA bundle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_postgres::config::SslMode;
use tokio_postgres_rustls::MakeRustlsConnect;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DbTls {
    /// Follow the URL: `sslmode=require` encrypts, anything else connects in plain text.
    #[default]
    Auto,
    Disable,
    /// Encrypt, accept any server certificate.
    Require,
    /// Encrypt and verify the server chain against this PEM bundle.
    Verify { ca_file: PathBuf },
}

impl DbTls {
    /// Settle `Auto` against the parsed connection string.
    pub fn resolve(&self, pg: &tokio_postgres::Config) -> DbTls {
        match self {
            DbTls::Auto if pg.get_ssl_mode() == SslMode::Require => DbTls::Require,
            DbTls::Auto => DbTls::Disable,
            other => other.clone(),
        }
    }

    /// Adjust the driver's sslmode and build the connector; `None` means plain TCP.
    pub fn connector(&self, pg: &mut tokio_postgres::Config) -> anyhow::Result<Option<MakeRustlsConnect>> {
        let config = match self {
            DbTls::Auto => return self.resolve(pg).connector(pg),
            DbTls::Disable => {
                pg.ssl_mode(SslMode::Disable);
                return Ok(None);
            }
            DbTls::Require => accept_any_config()?,
            DbTls::Verify { ca_file } => verifying_config(ca_file)?,
        };
        pg.ssl_mode(SslMode::Require);
        Ok(Some(MakeRustlsConnect::new(config)))
    }

    pub fn label(&self) -> &'static str {
        match self {
            DbTls::Auto => "auto",
            DbTls::Disable => "disable",
            DbTls::Require => "require",
            DbTls::Verify { .. } => "verify",
        }
    }
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

fn accept_any_config() -> anyhow::Result<ClientConfig> {
    let provider = provider();
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .context("tls protocol versions")?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
        .with_no_client_auth();
    Ok(config)
}

fn verifying_config(ca_file: &Path) -> anyhow::Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    let certs = CertificateDer::pem_file_iter(ca_file)
        .map_err(|e| anyhow!("cannot read CA file {}: {}", ca_file.display(), e))?;
    for cert in certs {
        let cert = cert.map_err(|e| anyhow!("bad certificate in {}: {}", ca_file.display(), e))?;
        roots.add(cert).with_context(|| format!("rejected certificate in {}", ca_file.display()))?;
    }
    if roots.is_empty() {
        return Err(anyhow!("no certificates found in {}", ca_file.display()));
    }
    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .context("tls protocol versions")?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(config)
}

/// Skips chain and hostname checks; handshake signatures are still verified.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn pg(url: &str) -> tokio_postgres::Config {
        url.parse().unwrap()
    }

    #[test]
    fn auto_follows_sslmode() {
        assert_eq!(DbTls::Auto.resolve(&pg("postgres://u@h/db?sslmode=require")), DbTls::Require);
        assert_eq!(DbTls::Auto.resolve(&pg("postgres://u@h/db?sslmode=disable")), DbTls::Disable);
        assert_eq!(DbTls::Auto.resolve(&pg("postgres://u@h/db")), DbTls::Disable);
        assert_eq!(DbTls::Require.resolve(&pg("postgres://u@h/db?sslmode=disable")), DbTls::Require);
    }

    #[test]
    fn require_builds_a_connector_and_forces_sslmode() {
        let mut cfg = pg("postgres://u@h/db");
        assert!(DbTls::Require.connector(&mut cfg).unwrap().is_some());
        assert_eq!(cfg.get_ssl_mode(), SslMode::Require);

        let mut cfg = pg("postgres://u@h/db?sslmode=require");
        assert!(DbTls::Auto.connector(&mut cfg).unwrap().is_some());
    }

    #[test]
    fn disable_stays_plain() {
        let mut cfg = pg("postgres://u@h/db?sslmode=prefer");
        assert!(DbTls::Disable.connector(&mut cfg).unwrap().is_none());
        assert_eq!(cfg.get_ssl_mode(), SslMode::Disable);
    }

    #[test]
    fn verify_needs_a_readable_ca_bundle() {
        let missing = DbTls::Verify { ca_file: PathBuf::from("/nonexistent/masterdata-ca.pem") };
        let err = missing.connector(&mut pg("postgres://u@h/db")).err().expect("expected an error");
        assert!(err.to_string().contains("masterdata-ca.pem"));

        let empty = std::env::temp_dir().join(format!("masterdata-empty-ca-{}.pem", std::process::id()));
        std::fs::write(&empty, "not a certificate\n").unwrap();
        let err = DbTls::Verify { ca_file: empty.clone() }.connector(&mut pg("postgres://u@h/db")).err().expect("expected an error");
        assert!(err.to_string().contains("no certificates"));
        let _ = std::fs::remove_file(empty);
    }
}
