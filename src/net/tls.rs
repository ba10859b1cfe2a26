//! TLS client policy.
//!
//! # Responsibilities
//! - Build one rustls `ClientConfig` per engine from `TlsConfig`
//! - Offer cipher suites in the configured order
//! - Let a caller callback override the default certificate verdict
//! - Apply revocation lists and extra trust anchors
//!
//! # Design Decisions
//! - Only `http/1.1` is offered via ALPN
//! - Cipher names follow the IANA spelling; TLS 1.3 names such as
//!   `TLS_AES_128_GCM_SHA256` are matched to the provider's `TLS13_*` suites
//! - Unknown cipher names are skipped with a warning rather than failing

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme, SupportedCipherSuite};
use tokio_rustls::TlsConnector;

use crate::config::{RevocationMode, TlsConfig, TlsVersion};
use crate::error::{EngineError, EngineResult};

/// What a certificate validator gets to see.
#[derive(Debug)]
pub struct CertificateCheck<'a> {
    pub server_name: String,
    pub end_entity: &'a CertificateDer<'a>,
    pub intermediates: &'a [CertificateDer<'a>],
    /// Why the default verifier rejected the chain, if it did.
    pub error: Option<&'a rustls::Error>,
}

impl CertificateCheck<'_> {
    /// True when the default verifier accepted the chain.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Callback deciding whether a server certificate is accepted.
pub type CertificateValidator = Arc<dyn Fn(&CertificateCheck<'_>) -> bool + Send + Sync>;

/// Per-engine TLS settings.
#[derive(Clone)]
pub struct TlsPolicy {
    config: Arc<ClientConfig>,
}

impl fmt::Debug for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsPolicy")
            .field("alpn_protocols", &self.config.alpn_protocols)
            .finish_non_exhaustive()
    }
}

impl TlsPolicy {
    pub fn from_config(config: &TlsConfig, validator: Option<CertificateValidator>) -> EngineResult<Self> {
        let defaults = ring::default_provider();
        let cipher_suites = order_cipher_suites(&defaults.cipher_suites, &config.cipher_suites)?;
        let provider = Arc::new(CryptoProvider {
            cipher_suites,
            ..defaults
        });

        let verifier = build_verifier(config, Arc::clone(&provider))?;
        let validator = if config.accept_invalid_certificates {
            Some(Arc::new(|_: &CertificateCheck<'_>| true) as CertificateValidator)
        } else {
            validator
        };

        let mut client = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&protocol_versions(config.min_version, config.max_version))
            .map_err(|e| EngineError::TlsConfig(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(CallbackVerifier { inner: verifier, validator }))
            .with_no_client_auth();
        client.alpn_protocols = vec![b"http/1.1".to_vec()];

        Ok(Self {
            config: Arc::new(client),
        })
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    pub fn connector(&self) -> TlsConnector {
        TlsConnector::from(self.client_config())
    }
}

fn protocol_versions(min: TlsVersion, max: TlsVersion) -> Vec<&'static rustls::SupportedProtocolVersion> {
    [
        (TlsVersion::Tls13, &rustls::version::TLS13),
        (TlsVersion::Tls12, &rustls::version::TLS12),
    ]
    .into_iter()
    .filter(|(v, _)| *v >= min && *v <= max)
    .map(|(_, p)| p)
    .collect()
}

/// Reorder `available` to follow `preferred`. An empty preference keeps the
/// provider order.
pub fn order_cipher_suites(
    available: &[SupportedCipherSuite],
    preferred: &[String],
) -> EngineResult<Vec<SupportedCipherSuite>> {
    if preferred.is_empty() {
        return Ok(available.to_vec());
    }

    let mut ordered: Vec<SupportedCipherSuite> = Vec::with_capacity(preferred.len());
    for name in preferred {
        let wanted = normalize_cipher_name(name);
        match available.iter().find(|s| format!("{:?}", s.suite()) == wanted) {
            Some(suite) if !ordered.iter().any(|o| o.suite() == suite.suite()) => ordered.push(*suite),
            Some(_) => {}
            None => tracing::warn!(cipher = %name, "Cipher suite not supported by the TLS provider, skipping"),
        }
    }

    if ordered.is_empty() {
        return Err(EngineError::TlsConfig(
            "none of the configured cipher suites is supported".to_string(),
        ));
    }
    Ok(ordered)
}

fn normalize_cipher_name(name: &str) -> String {
    let name = name.trim().to_ascii_uppercase();
    match name.strip_prefix("TLS_") {
        Some(rest) if !rest.contains("_WITH_") => format!("TLS13_{}", rest),
        _ => name,
    }
}

fn build_verifier(config: &TlsConfig, provider: Arc<CryptoProvider>) -> EngineResult<Arc<WebPkiServerVerifier>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    for path in &config.extra_root_paths {
        for cert in read_pem(path, |r| rustls_pemfile::certs(r).collect())? {
            roots
                .add(cert)
                .map_err(|e| EngineError::TlsConfig(format!("invalid root in {}: {}", path, e)))?;
        }
    }

    let mut builder = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider);

    if config.revocation != RevocationMode::NoCheck {
        let mut crls: Vec<CertificateRevocationListDer<'static>> = Vec::new();
        for path in &config.crl_paths {
            crls.extend(read_pem(path, |r| rustls_pemfile::crls(r).collect())?);
        }
        if crls.is_empty() {
            tracing::warn!(mode = ?config.revocation, "Revocation checking requested but no CRLs configured");
        }
        builder = builder.with_crls(crls).allow_unknown_revocation_status();
        if config.revocation == RevocationMode::EndEntity {
            builder = builder.only_check_end_entity_revocation();
        }
    }

    builder
        .build()
        .map_err(|e| EngineError::TlsConfig(e.to_string()))
}

fn read_pem<T>(
    path: &str,
    parse: impl FnOnce(&mut BufReader<File>) -> std::io::Result<Vec<T>>,
) -> EngineResult<Vec<T>> {
    let file = File::open(Path::new(path))
        .map_err(|e| EngineError::TlsConfig(format!("cannot open {}: {}", path, e)))?;
    parse(&mut BufReader::new(file)).map_err(|e| EngineError::TlsConfig(format!("cannot parse {}: {}", path, e)))
}

/// Runs the webpki verifier, then lets the validator callback have the last
/// word.
#[derive(Clone)]
struct CallbackVerifier {
    inner: Arc<WebPkiServerVerifier>,
    validator: Option<CertificateValidator>,
}

impl fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackVerifier")
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl ServerCertVerifier for CallbackVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let verdict = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now);

        let Some(validator) = &self.validator else {
            return verdict;
        };

        let check = CertificateCheck {
            server_name: server_name.to_str().into_owned(),
            end_entity,
            intermediates,
            error: verdict.as_ref().err(),
        };
        if validator(&check) {
            Ok(ServerCertVerified::assertion())
        } else {
            tracing::debug!(server_name = %check.server_name, "Certificate rejected by validator");
            verdict.and(Err(rustls::Error::General(
                "certificate rejected by validator".to_string(),
            )))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}
