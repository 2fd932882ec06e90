//! TLS and PEM helpers for the CMP client.
//!
//! CMP messages carry their own protection, so HTTPS is optional for CMP
//! over HTTP. When a CA URL uses `https`, the reqwest client built here
//! verifies the server against the configured trust anchors.

use der::Decode;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use x509_cert::request::CertReq;
use x509_cert::Certificate;

use crate::config::{ClientIdentity, CmpClientConfig, TrustAnchors};
use crate::error::{CmpError, Result};
use crate::types::content_types;

/// Build a reqwest Client with the appropriate TLS configuration.
pub fn build_http_client(config: &CmpClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(crate::USER_AGENT)
        .use_rustls_tls();

    match &config.trust_anchors {
        TrustAnchors::WebPki => {
            builder = builder.tls_built_in_root_certs(true);
        }
        TrustAnchors::Explicit(ca_certs) => {
            builder = builder.tls_built_in_root_certs(false);
            for ca_pem in ca_certs {
                let cert = reqwest::Certificate::from_pem(ca_pem).map_err(|e| {
                    CmpError::configuration(format!("Failed to parse TLS CA certificate: {e}"))
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }
        TrustAnchors::InsecureAcceptAny => {
            builder = builder
                .tls_built_in_root_certs(false)
                .danger_accept_invalid_certs(true);
        }
    }

    if let Some(ref identity) = config.client_identity {
        builder = builder.identity(build_reqwest_identity(identity)?);
    }

    builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_2);

    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static(content_types::PKIXCMP),
    );
    for (name, value) in &config.additional_headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::try_from(name.as_str()),
            reqwest::header::HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }
    builder = builder.default_headers(headers);

    builder
        .build()
        .map_err(|e| CmpError::configuration(format!("Failed to build HTTP client: {e}")))
}

fn build_reqwest_identity(identity: &ClientIdentity) -> Result<reqwest::Identity> {
    let mut pem_data = identity.cert_pem.clone();
    pem_data.extend_from_slice(b"\n");
    pem_data.extend_from_slice(&identity.key_pem);

    reqwest::Identity::from_pem(&pem_data)
        .map_err(|e| CmpError::configuration(format!("Failed to create client identity: {e}")))
}

/// Parse PEM-encoded certificates.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| result.ok())
        .collect();

    if certs.is_empty() {
        return Err(CmpError::configuration("No certificates found in PEM data"));
    }

    Ok(certs)
}

/// Parse PEM-encoded certificates into X.509 structures.
pub fn parse_x509_certificates(pem_data: &[u8]) -> Result<Vec<Certificate>> {
    parse_pem_certificates(pem_data)?
        .iter()
        .map(|der| {
            Certificate::from_der(der.as_ref())
                .map_err(|e| CmpError::configuration(format!("Invalid certificate: {e}")))
        })
        .collect()
}

/// Parse a PEM-encoded private key.
pub fn parse_pem_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem_data);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CmpError::configuration(format!("Failed to parse PEM: {e}")))?
        .ok_or_else(|| CmpError::configuration("No private key found in PEM data"))
}

/// Parse a PEM-encoded RSA private key (PKCS#8 or PKCS#1).
pub fn parse_rsa_private_key(pem_data: &[u8]) -> Result<RsaPrivateKey> {
    let key = parse_pem_private_key(pem_data)?;
    let parsed = match &key {
        PrivateKeyDer::Pkcs8(der) => RsaPrivateKey::from_pkcs8_der(der.secret_pkcs8_der())
            .map_err(|e| e.to_string()),
        PrivateKeyDer::Pkcs1(der) => {
            RsaPrivateKey::from_pkcs1_der(der.secret_pkcs1_der()).map_err(|e| e.to_string())
        }
        _ => Err("only RSA keys are supported".to_string()),
    };
    parsed.map_err(|e| CmpError::configuration(format!("Invalid RSA private key: {e}")))
}

/// Parse a PEM-encoded PKCS#10 certificate request.
pub fn parse_pem_csr(pem_data: &[u8]) -> Result<CertReq> {
    let mut reader = std::io::BufReader::new(pem_data);
    let csr = rustls_pemfile::csr(&mut reader)
        .map_err(|e| CmpError::configuration(format!("Failed to parse PEM: {e}")))?
        .ok_or_else(|| CmpError::configuration("No certificate request found in PEM data"))?;
    CertReq::from_der(csr.as_ref())
        .map_err(|e| CmpError::configuration(format!("Invalid certificate request: {e}")))
}
