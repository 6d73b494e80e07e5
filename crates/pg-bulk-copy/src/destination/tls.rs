//! rustls connectors for the `ssl_mode` setting.
//!
//! Every TLS mode verifies the handshake signatures. The modes differ in how
//! much of the server certificate is checked:
//!
//! | mode          | chain to web PKI roots | host name |
//! |---------------|------------------------|-----------|
//! | `require`     | no                     | no        |
//! | `verify-ca`   | yes                    | no        |
//! | `verify-full` | yes                    | yes       |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::{verify_server_cert_signed_by_trust_anchor, verify_server_name};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::ParsedCertificate;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::warn;

use crate::error::{BulkCopyError, Result};

/// PostgreSQL `sslmode` values understood by [`PgConnection`](super::PgConnection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl FromStr for SslMode {
    type Err = BulkCopyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "require" | "" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(BulkCopyError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, require, verify-ca, verify-full",
                other
            ))),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SslMode::Disable => "disable",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        })
    }
}

impl SslMode {
    /// Build the connector for this mode, or `None` for a plain TCP connection.
    pub fn connector(self) -> Result<Option<MakeRustlsConnect>> {
        let verifier = match self {
            SslMode::Disable => return Ok(None),
            SslMode::Require => {
                warn!(
                    "ssl_mode=require does not verify the server certificate; \
                     use verify-full outside trusted networks"
                );
                CertVerifier::new(false, false)
            }
            SslMode::VerifyCa => CertVerifier::new(true, false),
            SslMode::VerifyFull => CertVerifier::new(true, true),
        };

        let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| BulkCopyError::Config(format!("TLS setup failed: {}", e)))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();
        Ok(Some(MakeRustlsConnect::new(config)))
    }
}

#[derive(Debug)]
struct CertVerifier {
    roots: RootCertStore,
    algorithms: WebPkiSupportedAlgorithms,
    check_chain: bool,
    check_name: bool,
}

impl CertVerifier {
    fn new(check_chain: bool, check_name: bool) -> Self {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        Self {
            roots,
            algorithms: rustls::crypto::aws_lc_rs::default_provider()
                .signature_verification_algorithms,
            check_chain,
            check_name,
        }
    }
}

impl ServerCertVerifier for CertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.check_chain || self.check_name {
            let cert = ParsedCertificate::try_from(end_entity)?;
            if self.check_chain {
                verify_server_cert_signed_by_trust_anchor(
                    &cert,
                    &self.roots,
                    intermediates,
                    now,
                    self.algorithms.all,
                )?;
            }
            if self.check_name {
                verify_server_name(&cert, server_name)?;
            }
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssl_mode_parsing() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("REQUIRE".parse::<SslMode>().unwrap(), SslMode::Require);
        assert_eq!(" verify-ca ".parse::<SslMode>().unwrap(), SslMode::VerifyCa);
        assert_eq!("verify-full".parse::<SslMode>().unwrap(), SslMode::VerifyFull);
        assert_eq!("".parse::<SslMode>().unwrap(), SslMode::Require);
        let err = "prefer".parse::<SslMode>().unwrap_err();
        assert!(err.to_string().contains("prefer"));
    }

    #[test]
    fn test_display_parses_back() {
        for mode in [
            SslMode::Disable,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert_eq!(mode.to_string().parse::<SslMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_connector_per_mode() {
        assert!(SslMode::Disable.connector().unwrap().is_none());
        assert!(SslMode::Require.connector().unwrap().is_some());
        assert!(SslMode::VerifyCa.connector().unwrap().is_some());
        assert!(SslMode::VerifyFull.connector().unwrap().is_some());
    }

    #[test]
    fn test_verifier_checks() {
        let require = CertVerifier::new(false, false);
        assert!(!require.check_chain && !require.check_name);
        let verify_ca = CertVerifier::new(true, false);
        assert!(verify_ca.check_chain && !verify_ca.check_name);
        assert!(!verify_ca.roots.is_empty());
        assert!(!verify_ca.supported_verify_schemes().is_empty());
    }

    #[test]
    fn test_require_accepts_unparseable_certificate() {
        let cert = CertificateDer::from(vec![0u8; 4]);
        let name = ServerName::try_from("db.example.com").unwrap();
        let now = UnixTime::now();
        assert!(CertVerifier::new(false, false)
            .verify_server_cert(&cert, &[], &name, &[], now)
            .is_ok());
        assert!(CertVerifier::new(true, false)
            .verify_server_cert(&cert, &[], &name, &[], now)
            .is_err());
        assert!(CertVerifier::new(true, true)
            .verify_server_cert(&cert, &[], &name, &[], now)
            .is_err());
    }
}
