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

//! Result of a successful enrollment.

use base64::prelude::*;
use der::Encode;
use x509_cert::Certificate;

use crate::error::Result;

/// Certificates returned by the CA.
///
/// `certificate_chain[0]` is always the issued certificate; any intermediates
/// follow it leaf-to-root. `trusted_certificates` holds the remaining
/// CA-supplied certificates, normally the root(s).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cmpv2CertificationModel {
    certificate_chain: Vec<Certificate>,
    trusted_certificates: Vec<Certificate>,
}

impl Cmpv2CertificationModel {
    pub(crate) fn new(
        certificate_chain: Vec<Certificate>,
        trusted_certificates: Vec<Certificate>,
    ) -> Self {
        Self {
            certificate_chain,
            trusted_certificates,
        }
    }

    /// The issued certificate.
    pub fn certificate(&self) -> &Certificate {
        // never empty: the verifier always places the leaf first
        &self.certificate_chain[0]
    }

    /// Issued certificate followed by its intermediates.
    pub fn certificate_chain(&self) -> &[Certificate] {
        &self.certificate_chain
    }

    /// CA certificates to install as trust anchors.
    pub fn trusted_certificates(&self) -> &[Certificate] {
        &self.trusted_certificates
    }

    /// The chain as concatenated PEM blocks.
    pub fn certificate_chain_pem(&self) -> Result<String> {
        to_pem_bundle(&self.certificate_chain)
    }

    /// The trusted certificates as concatenated PEM blocks.
    pub fn trusted_certificates_pem(&self) -> Result<String> {
        to_pem_bundle(&self.trusted_certificates)
    }

    /// Consume the model, returning `(chain, trusted)`.
    pub fn into_parts(self) -> (Vec<Certificate>, Vec<Certificate>) {
        (self.certificate_chain, self.trusted_certificates)
    }
}

fn to_pem_bundle(certs: &[Certificate]) -> Result<String> {
    let mut pem = String::new();
    for cert in certs {
        let encoded = BASE64_STANDARD.encode(cert.to_der()?);
        pem.push_str("-----BEGIN CERTIFICATE-----\n");
        for line in encoded.as_bytes().chunks(64) {
            pem.extend(line.iter().map(|&b| char::from(b)));
            pem.push('\n');
        }
        pem.push_str("-----END CERTIFICATE-----\n");
    }
    Ok(pem)
}
