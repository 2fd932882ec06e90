// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! CA server descriptors and the directory that resolves them by name.
//!
//! Descriptors are normally loaded once from a `cmpServers.json` style file:
//!
//! ```json
//! {
//!   "cmpv2Servers": [
//!     {
//!       "caName": "Client",
//!       "url": "http://ejbca:8080/ejbca/publicweb/cmp/cmp",
//!       "issuerDN": "CN=ManagementCA",
//!       "caMode": "CLIENT",
//!       "authentication": { "iak": "mypassword", "rv": "mypassword" }
//!     }
//!   ]
//! }
//! ```
//!
//! The same keys are accepted in TOML. After loading, the directory is
//! read-only and can be shared between concurrent enrollments.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rsa::RsaPrivateKey;
use serde::Deserialize;
use url::Url;
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::error::{CmpError, Result};
use crate::protection::rsa_public_key;
use crate::tls::{parse_rsa_private_key, parse_x509_certificates};

/// Maximum length of a CA name.
pub const MAX_CA_NAME_LEN: usize = 128;

/// Maximum length of the shared secret and reference value.
pub const MAX_SECRET_LEN: usize = 256;

/// Whether the CA is addressed directly or through a registration authority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaMode {
    /// Requests go through an RA.
    Ra,
    /// The end entity talks to the CA directly.
    #[default]
    Client,
}

impl fmt::Display for CaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ra => f.write_str("RA"),
            Self::Client => f.write_str("CLIENT"),
        }
    }
}

/// How requests to a CA are protected.
#[derive(Clone)]
pub enum Authentication {
    /// PasswordBasedMac with an out-of-band shared secret.
    SharedSecret {
        /// Initial authentication key (the shared secret).
        iak: String,
        /// Reference value identifying the secret to the CA (sent as senderKID).
        rv: String,
    },
    /// Signature with an existing certificate and key.
    Signature(ClientCredential),
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedSecret { .. } => f
                .debug_struct("SharedSecret")
                .field("iak", &"*****")
                .field("rv", &"*****")
                .finish(),
            Self::Signature(credential) => f.debug_tuple("Signature").field(credential).finish(),
        }
    }
}

/// A certificate and the RSA key it certifies.
#[derive(Clone)]
pub struct ClientCredential {
    /// The certificate.
    pub certificate: Certificate,
    private_key: RsaPrivateKey,
}

impl ClientCredential {
    /// Pair a certificate with its private key.
    ///
    /// # Errors
    ///
    /// Returns [`CmpError::Configuration`] when the key does not match the
    /// certificate's public key.
    pub fn new(certificate: Certificate, private_key: RsaPrivateKey) -> Result<Self> {
        let public_key = rsa_public_key(&certificate.tbs_certificate.subject_public_key_info)
            .map_err(|e| CmpError::configuration(format!("Unusable credential: {e}")))?;
        if public_key != private_key.to_public_key() {
            return Err(CmpError::configuration(
                "Private key does not match the credential certificate",
            ));
        }
        Ok(Self {
            certificate,
            private_key,
        })
    }

    /// Load a credential from PEM data.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let certificate = parse_x509_certificates(cert_pem)?
            .into_iter()
            .next()
            .ok_or_else(|| CmpError::configuration("No certificate found in PEM data"))?;
        let private_key = parse_rsa_private_key(key_pem)?;
        Self::new(certificate, private_key)
    }

    /// Load a credential from PEM files.
    pub fn from_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self> {
        Self::from_pem(&read_file(cert_path.as_ref())?, &read_file(key_path.as_ref())?)
    }

    /// The private key.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .field("private_key", &"*****")
            .finish()
    }
}

/// Connection and trust parameters of one CA.
#[derive(Clone, Debug)]
pub struct CaServerDescriptor {
    /// Logical name, unique within a directory.
    pub ca_name: String,

    /// CMP endpoint.
    pub url: Url,

    /// Issuer DN; used as the request recipient and to validate responses.
    pub issuer_dn: Name,

    /// Addressing mode.
    pub ca_mode: CaMode,

    /// Request protection.
    pub authentication: Authentication,

    /// Pinned CA certificate that signed responses must chain to. Required
    /// for signature authentication and key update.
    pub ca_certificate: Option<Certificate>,

    /// Whether the CA accepts implicit confirmation.
    pub implicit_confirm: bool,
}

impl CaServerDescriptor {
    /// Create a new descriptor builder.
    pub fn builder() -> CaServerDescriptorBuilder {
        CaServerDescriptorBuilder::default()
    }
}

/// Builder for [`CaServerDescriptor`].
#[derive(Default)]
pub struct CaServerDescriptorBuilder {
    ca_name: Option<String>,
    url: Option<String>,
    issuer_dn: Option<String>,
    ca_mode: CaMode,
    authentication: Option<Authentication>,
    ca_certificate: Option<Certificate>,
    implicit_confirm: Option<bool>,
}

impl CaServerDescriptorBuilder {
    /// Set the logical CA name.
    pub fn ca_name(mut self, name: impl Into<String>) -> Self {
        self.ca_name = Some(name.into());
        self
    }

    /// Set the CMP endpoint URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the issuer DN (e.g. `"CN=ManagementCA,O=Example"`).
    pub fn issuer_dn(mut self, dn: impl Into<String>) -> Self {
        self.issuer_dn = Some(dn.into());
        self
    }

    /// Set the addressing mode.
    pub fn ca_mode(mut self, mode: CaMode) -> Self {
        self.ca_mode = mode;
        self
    }

    /// Protect requests with a shared secret.
    pub fn shared_secret(mut self, iak: impl Into<String>, rv: impl Into<String>) -> Self {
        self.authentication = Some(Authentication::SharedSecret {
            iak: iak.into(),
            rv: rv.into(),
        });
        self
    }

    /// Protect requests with a signature.
    pub fn signature(mut self, credential: ClientCredential) -> Self {
        self.authentication = Some(Authentication::Signature(credential));
        self
    }

    /// Pin the CA certificate.
    pub fn ca_certificate(mut self, certificate: Certificate) -> Self {
        self.ca_certificate = Some(certificate);
        self
    }

    /// Declare implicit-confirm support (default `true`).
    pub fn implicit_confirm(mut self, enabled: bool) -> Self {
        self.implicit_confirm = Some(enabled);
        self
    }

    /// Validate and build the descriptor.
    pub fn build(self) -> Result<CaServerDescriptor> {
        let ca_name = self
            .ca_name
            .ok_or_else(|| CmpError::configuration("caName is required"))?;
        if ca_name.is_empty() || ca_name.chars().count() > MAX_CA_NAME_LEN {
            return Err(CmpError::configuration(format!(
                "caName must be 1..={MAX_CA_NAME_LEN} characters"
            )));
        }

        let url = self
            .url
            .ok_or_else(|| CmpError::configuration(format!("url is required for {ca_name}")))?;
        let url = Url::parse(&url)
            .map_err(|e| CmpError::configuration(format!("Invalid url for {ca_name}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
            return Err(CmpError::configuration(format!(
                "url for {ca_name} must be an absolute http or https URL"
            )));
        }

        let issuer_dn = self
            .issuer_dn
            .ok_or_else(|| CmpError::configuration(format!("issuerDN is required for {ca_name}")))?;
        let issuer_dn = Name::from_str(&issuer_dn).map_err(|e| {
            CmpError::configuration(format!("Invalid issuerDN for {ca_name}: {e}"))
        })?;
        if issuer_dn.0.is_empty() {
            return Err(CmpError::configuration(format!(
                "issuerDN for {ca_name} must not be empty"
            )));
        }

        let authentication = self.authentication.ok_or_else(|| {
            CmpError::configuration(format!("authentication is required for {ca_name}"))
        })?;
        match &authentication {
            Authentication::SharedSecret { iak, rv } => {
                for (field, value) in [("iak", iak), ("rv", rv)] {
                    if value.is_empty() || value.chars().count() > MAX_SECRET_LEN {
                        return Err(CmpError::configuration(format!(
                            "{field} for {ca_name} must be 1..={MAX_SECRET_LEN} characters"
                        )));
                    }
                }
            }
            Authentication::Signature(_) if self.ca_certificate.is_none() => {
                return Err(CmpError::configuration(format!(
                    "caCertificate is required for signature authentication of {ca_name}"
                )));
            }
            Authentication::Signature(_) => {}
        }

        Ok(CaServerDescriptor {
            ca_name,
            url,
            issuer_dn,
            ca_mode: self.ca_mode,
            authentication,
            ca_certificate: self.ca_certificate,
            implicit_confirm: self.implicit_confirm.unwrap_or(true),
        })
    }
}

/// Read-only collection of CA descriptors, looked up by name.
#[derive(Clone, Debug, Default)]
pub struct ServerDirectory {
    servers: Vec<CaServerDescriptor>,
}

impl ServerDirectory {
    /// Build a directory, rejecting duplicate names.
    pub fn new(servers: Vec<CaServerDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for server in &servers {
            if !seen.insert(server.ca_name.as_str()) {
                return Err(CmpError::configuration(format!(
                    "Duplicate caName: {}",
                    server.ca_name
                )));
            }
        }
        Ok(Self { servers })
    }

    /// Parse a `cmpServers.json` document. Relative paths resolve against the
    /// working directory.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ServersFile = serde_json::from_str(json)
            .map_err(|e| CmpError::configuration(format!("Invalid server config: {e}")))?;
        file.into_directory(None)
    }

    /// Parse the TOML form of the server configuration.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let file: ServersFile = toml::from_str(toml)
            .map_err(|e| CmpError::configuration(format!("Invalid server config: {e}")))?;
        file.into_directory(None)
    }

    /// Load a configuration file; `.toml` files are parsed as TOML, anything
    /// else as JSON. Relative paths resolve against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CmpError::configuration(format!("Cannot read {}: {e}", path.display()))
        })?;
        let file: ServersFile = if path.extension().is_some_and(|ext| ext == "toml") {
            toml::from_str(&contents).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&contents).map_err(|e| e.to_string())
        }
        .map_err(|e| CmpError::configuration(format!("Invalid server config: {e}")))?;

        tracing::debug!("Loaded CMP server config from {}", path.display());
        file.into_directory(path.parent())
    }

    /// Look up a CA by name.
    pub fn resolve(&self, name: &str) -> Result<&CaServerDescriptor> {
        self.servers
            .iter()
            .find(|server| server.ca_name == name)
            .ok_or_else(|| CmpError::server_not_found(name))
    }

    /// Names of all registered CAs.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|server| server.ca_name.as_str())
    }

    /// Number of registered CAs.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns true if no CA is registered.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServersFile {
    cmpv2_servers: Vec<ServerEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerEntry {
    ca_name: String,
    url: String,
    #[serde(rename = "issuerDN")]
    issuer_dn: String,
    #[serde(default)]
    ca_mode: CaMode,
    authentication: AuthenticationEntry,
    #[serde(default)]
    ca_certificate: Option<PathBuf>,
    #[serde(default)]
    implicit_confirm: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AuthenticationEntry {
    SharedSecret {
        iak: String,
        rv: String,
    },
    Signature {
        certificate: PathBuf,
        #[serde(rename = "privateKey")]
        private_key: PathBuf,
    },
}

impl ServersFile {
    fn into_directory(self, base: Option<&Path>) -> Result<ServerDirectory> {
        let resolve = |path: PathBuf| match base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        };

        let mut servers = Vec::with_capacity(self.cmpv2_servers.len());
        for entry in self.cmpv2_servers {
            let mut builder = CaServerDescriptor::builder()
                .ca_name(entry.ca_name)
                .url(entry.url)
                .issuer_dn(entry.issuer_dn)
                .ca_mode(entry.ca_mode);

            builder = match entry.authentication {
                AuthenticationEntry::SharedSecret { iak, rv } => builder.shared_secret(iak, rv),
                AuthenticationEntry::Signature {
                    certificate,
                    private_key,
                } => builder.signature(ClientCredential::from_files(
                    resolve(certificate),
                    resolve(private_key),
                )?),
            };

            if let Some(path) = entry.ca_certificate {
                let pem = read_file(&resolve(path))?;
                let cert = parse_x509_certificates(&pem)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| CmpError::configuration("No CA certificate found"))?;
                builder = builder.ca_certificate(cert);
            }
            if let Some(enabled) = entry.implicit_confirm {
                builder = builder.implicit_confirm(enabled);
            }

            servers.push(builder.build()?);
        }

        ServerDirectory::new(servers)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| CmpError::configuration(format!("Cannot read {}: {e}", path.display())))
}
