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

//! Configuration types for the CMP client.
//!
//! This module holds the settings that apply to every CA the client talks
//! to: HTTP timeout, TLS trust and client identity, and the polling budget
//! for delayed delivery. Per-CA settings live in [`crate::directory`].

use std::time::Duration;

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on a CA response body (1 MiB).
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = 1024 * 1024;

/// Configuration for a CMP client.
#[derive(Clone)]
pub struct CmpClientConfig {
    /// Client identity for TLS client certificate authentication.
    pub client_identity: Option<ClientIdentity>,

    /// Trust anchor configuration for HTTPS server verification.
    pub trust_anchors: TrustAnchors,

    /// Timeout for a single request/response round trip.
    pub timeout: Duration,

    /// Additional HTTP headers to include in requests.
    pub additional_headers: Vec<(String, String)>,

    /// Largest response body accepted from a CA, in bytes.
    pub max_response_size: usize,

    /// Polling budget for delayed delivery.
    pub polling: PollingConfig,
}

impl std::fmt::Debug for CmpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmpClientConfig")
            .field("client_identity", &self.client_identity.is_some())
            .field("trust_anchors", &self.trust_anchors)
            .field("timeout", &self.timeout)
            .field("max_response_size", &self.max_response_size)
            .field("polling", &self.polling)
            .finish()
    }
}

impl Default for CmpClientConfig {
    fn default() -> Self {
        Self {
            client_identity: None,
            trust_anchors: TrustAnchors::WebPki,
            timeout: DEFAULT_TIMEOUT,
            additional_headers: Vec::new(),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            polling: PollingConfig::default(),
        }
    }
}

impl CmpClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CmpClientConfigBuilder {
        CmpClientConfigBuilder::new()
    }
}

/// Builder for [`CmpClientConfig`].
#[derive(Default)]
pub struct CmpClientConfigBuilder {
    client_identity: Option<ClientIdentity>,
    trust_anchors: Option<TrustAnchors>,
    timeout: Option<Duration>,
    additional_headers: Vec<(String, String)>,
    max_response_size: Option<usize>,
    polling: Option<PollingConfig>,
}

impl CmpClientConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the client identity for TLS client authentication.
    pub fn client_identity(mut self, identity: ClientIdentity) -> Self {
        self.client_identity = Some(identity);
        self
    }

    /// Use Mozilla's root CA store for HTTPS server verification.
    pub fn trust_webpki_roots(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::WebPki);
        self
    }

    /// Use explicit CA certificates (PEM) for HTTPS server verification.
    pub fn trust_explicit(mut self, ca_certs: Vec<Vec<u8>>) -> Self {
        self.trust_anchors = Some(TrustAnchors::Explicit(ca_certs));
        self
    }

    /// Accept any server certificate (insecure, for testing only).
    pub fn trust_any_insecure(mut self) -> Self {
        self.trust_anchors = Some(TrustAnchors::InsecureAcceptAny);
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an additional HTTP header to all requests.
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.push((name.into(), value.into()));
        self
    }

    /// Set the largest response body accepted from a CA.
    pub fn max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = Some(bytes);
        self
    }

    /// Set the polling budget.
    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = Some(polling);
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout or the response size limit is zero, or
    /// the polling budget allows no polls.
    pub fn build(self) -> Result<CmpClientConfig, &'static str> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        if timeout.is_zero() {
            return Err("timeout must be greater than zero");
        }
        let max_response_size = self.max_response_size.unwrap_or(DEFAULT_MAX_RESPONSE_SIZE);
        if max_response_size == 0 {
            return Err("max_response_size must be greater than zero");
        }
        let polling = self.polling.unwrap_or_default();
        if polling.max_polls == 0 {
            return Err("max_polls must be at least 1");
        }

        Ok(CmpClientConfig {
            client_identity: self.client_identity,
            trust_anchors: self.trust_anchors.unwrap_or(TrustAnchors::WebPki),
            timeout,
            additional_headers: self.additional_headers,
            max_response_size,
            polling,
        })
    }
}

/// Bounds on the poll loop used for delayed delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Wait between polls when the CA does not suggest one.
    pub interval: Duration,

    /// Upper bound on a CA-suggested `checkAfter`.
    pub max_interval: Duration,

    /// Maximum number of poll requests per enrollment.
    pub max_polls: u32,

    /// Maximum total time spent polling, if any.
    pub deadline: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            max_polls: 10,
            deadline: Some(Duration::from_secs(600)),
        }
    }
}

impl PollingConfig {
    /// Set the default wait between polls.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Cap CA-suggested waits.
    pub fn max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Set the maximum number of poll requests.
    pub fn max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Set the total polling deadline.
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Wait before the next poll given the CA's `checkAfter` in seconds.
    pub fn wait_for(&self, check_after: i64) -> Duration {
        if check_after <= 0 {
            self.interval
        } else {
            Duration::from_secs(check_after as u64).min(self.max_interval)
        }
    }
}

/// Client identity for TLS client certificate authentication.
#[derive(Clone)]
pub struct ClientIdentity {
    /// PEM-encoded certificate chain, client certificate first.
    pub cert_pem: Vec<u8>,

    /// PEM-encoded private key.
    pub key_pem: Vec<u8>,
}

impl ClientIdentity {
    /// Create a new client identity from PEM-encoded data.
    pub fn new(cert_pem: impl Into<Vec<u8>>, key_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            cert_pem: cert_pem.into(),
            key_pem: key_pem.into(),
        }
    }

    /// Create a client identity from file paths.
    pub fn from_files(
        cert_path: impl AsRef<std::path::Path>,
        key_path: impl AsRef<std::path::Path>,
    ) -> std::io::Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Ok(Self { cert_pem, key_pem })
    }
}

/// Trust anchor configuration for HTTPS server verification.
///
/// This governs the TLS channel only; CMP message protection is checked
/// separately against the CA descriptor.
#[derive(Clone)]
pub enum TrustAnchors {
    /// Use Mozilla's root CA store.
    WebPki,

    /// Use explicit CA certificates (PEM-encoded).
    Explicit(Vec<Vec<u8>>),

    /// Accept any server certificate (insecure, for testing only).
    ///
    /// **WARNING**: This disables all server certificate verification.
    InsecureAcceptAny,
}

impl std::fmt::Debug for TrustAnchors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WebPki => write!(f, "WebPki"),
            Self::Explicit(certs) => write!(f, "Explicit({} certs)", certs.len()),
            Self::InsecureAcceptAny => write!(f, "InsecureAcceptAny"),
        }
    }
}
