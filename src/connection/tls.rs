//! TLS for connections that send an SSL request after the greeting.
//!
//! The harness ships a self-signed CA (`ssl/certs/ca.pem`) and, like the
//! driver it imitates, does not reject servers whose certificate fails to
//! verify unless asked to.

use crate::config::TlsMaterial;
use crate::{Error, Result};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pemfile::Item;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use std::sync::Arc;

/// Compiled client-side TLS settings
#[derive(Clone)]
pub struct TlsConfig {
    reject_unauthorized: bool,
    client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    /// Build from resolved TLS material.
    ///
    /// An empty CA bundle falls back to the platform roots, then to the
    /// bundled webpki roots.
    pub fn from_material(material: &TlsMaterial) -> Result<Self> {
        let client_config = if material.reject_unauthorized {
            let roots = if material.ca_pem.trim().is_empty() {
                default_roots()
            } else {
                load_pem_roots(&material.ca_pem)?
            };
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert::new()))
                .with_no_client_auth()
        };

        Ok(Self {
            reject_unauthorized: material.reject_unauthorized,
            client_config: Arc::new(client_config),
        })
    }

    /// Get the rustls ClientConfig
    pub fn client_config(&self) -> Arc<ClientConfig> {
        self.client_config.clone()
    }

    /// Whether certificate chain failures abort the handshake
    pub fn reject_unauthorized(&self) -> bool {
        self.reject_unauthorized
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("reject_unauthorized", &self.reject_unauthorized)
            .field("client_config", &"<ClientConfig>")
            .finish()
    }
}

fn load_pem_roots(pem: &str) -> Result<RootCertStore> {
    let mut reader = std::io::Cursor::new(pem.as_bytes());
    let mut root_store = RootCertStore::empty();
    let mut found_certs = 0;

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(Item::X509Certificate(cert))) => {
                let _ = root_store.add_parsable_certificates(std::iter::once(cert));
                found_certs += 1;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to parse CA certificate: {}",
                    e
                )))
            }
        }
    }

    if found_certs == 0 {
        return Err(Error::Config("no certificates found in CA bundle".into()));
    }

    Ok(root_store)
}

fn default_roots() -> RootCertStore {
    let mut store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        let _ = store.add_parsable_certificates(std::iter::once(cert));
    }
    if store.is_empty() {
        tracing::debug!("no platform root certificates, using webpki roots");
        store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    store
}

/// Skips chain and hostname checks but still verifies handshake signatures
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl AcceptAnyServerCert {
    fn new() -> Self {
        let provider = CryptoProvider::get_default()
            .cloned()
            .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
        Self { provider }
    }
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Parse a host into a TLS server name (SNI). IP literals are accepted.
pub fn parse_server_name(hostname: &str) -> Result<ServerName<'static>> {
    let hostname = hostname.trim_end_matches('.');

    if hostname.is_empty() || hostname.len() > 253 {
        return Err(Error::Config(format!(
            "invalid hostname for TLS: '{}'",
            hostname
        )));
    }

    ServerName::try_from(hostname.to_string())
        .map_err(|_| Error::Config(format!("invalid hostname for TLS: '{}'", hostname)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_any_by_default() {
        let tls = TlsConfig::from_material(&TlsMaterial {
            ca_pem: String::new(),
            reject_unauthorized: false,
        })
        .expect("tls config");
        assert!(!tls.reject_unauthorized());
        assert!(format!("{:?}", tls).contains("reject_unauthorized"));
    }

    #[test]
    fn test_verifying_config_with_default_roots() {
        let tls = TlsConfig::from_material(&TlsMaterial {
            ca_pem: String::new(),
            reject_unauthorized: true,
        })
        .expect("tls config");
        assert!(tls.reject_unauthorized());
    }

    #[test]
    fn test_garbage_ca_bundle_is_rejected() {
        let err = TlsConfig::from_material(&TlsMaterial {
            ca_pem: "not a certificate".into(),
            reject_unauthorized: true,
        })
        .unwrap_err();
        assert_eq!(err.code(), "ERR_INVALID_CONFIG");
    }

    #[test]
    fn test_parse_server_name_valid() {
        assert!(parse_server_name("localhost").is_ok());
        assert!(parse_server_name("db.internal.example.com").is_ok());
        assert!(parse_server_name("example.com.").is_ok());
        assert!(parse_server_name("127.0.0.1").is_ok());
    }

    #[test]
    fn test_parse_server_name_kinds() {
        assert!(matches!(parse_server_name("localhost").unwrap(), ServerName::DnsName(_)));
        assert!(matches!(parse_server_name("10.0.0.1").unwrap(), ServerName::IpAddress(_)));
    }

    #[test]
    fn test_parse_server_name_invalid() {
        assert!(parse_server_name("").is_err());
        assert!(parse_server_name("bad host").is_err());
    }
}
