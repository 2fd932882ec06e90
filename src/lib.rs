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

//! # usg-cmp-client
//!
//! A Rust implementation of a CMPv2 (RFC 4210 / RFC 4211) certificate
//! enrollment client.
//!
//! CMP is a binary request/response protocol for obtaining X.509
//! certificates from a CA. This library implements the end-entity side of
//! the enrollment exchanges: initialization, certification and key update
//! requests, delayed delivery by polling, and certificate confirmation.
//!
//! ## Features
//!
//! - **Async-first design** using Tokio, with cancellable polling
//! - **Named CA directory** loaded from JSON or TOML
//! - **Shared-secret protection** (PasswordBasedMac) and **signature
//!   protection** (RSA) of every message
//! - **Strict response checks**: transaction ID, nonce echo and protection
//!   are verified before any body is trusted
//! - **CMP over HTTP** (RFC 6712) with rustls
//!
//! ## Quick Start
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use usg_cmp_client::{CmpClient, CmpClientConfig, EnrollmentRequest, ServerDirectory};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load CA descriptors
//!     let directory = ServerDirectory::from_file("cmpServers.json")?;
//!
//!     // Create CMP client
//!     let config = CmpClientConfig::builder().build()?;
//!     let client = CmpClient::new(directory, config)?;
//!
//!     // Enroll using a CSR and its key
//!     let request = EnrollmentRequest::from_pem(
//!         &std::fs::read("workload.csr")?,
//!         &std::fs::read("workload.key")?,
//!     )?;
//!     let model = client
//!         .enroll("RA", &request, &CancellationToken::new())
//!         .await?;
//!
//!     println!("Chain has {} certificates", model.certificate_chain().len());
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! Every failure is a single [`CmpError`]. [`CmpError::kind`] gives a stable
//! classification for mapping to exit codes. Nothing is retried except the
//! bounded poll loop; a failed enrollment must be started again from
//! scratch and gets fresh identifiers.
//!
//! ## RFC Compliance
//!
//! This library implements:
//! - RFC 4210 Section 5.1: PKIMessage, PKIHeader and message protection
//! - RFC 4210 Section 5.3: ir/ip, cr/cp, kur/kup, certConf/pkiconf,
//!   pollReq/pollRep and error bodies
//! - RFC 4211: CertReqMessages, CertTemplate and POPOSigningKey
//! - RFC 6712: CMP over HTTP

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod protection;
pub mod request;
pub mod session;
pub mod tls;
pub mod transport;
pub mod types;
pub mod verify;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root for convenience
pub use client::CmpClient;
pub use config::{
    ClientIdentity, CmpClientConfig, CmpClientConfigBuilder, PollingConfig, TrustAnchors,
};
pub use directory::{
    Authentication, CaMode, CaServerDescriptor, ClientCredential, ServerDirectory,
};
pub use error::{CmpError, ErrorKind, Result};
pub use request::EnrollmentRequest;
pub use transport::{HttpTransport, Transport};
pub use types::{Cmpv2CertificationModel, PkiFailureInfo, PkiStatus};

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("usg-cmp-client/", env!("CARGO_PKG_VERSION"));
