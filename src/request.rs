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

//! Caller-supplied enrollment input and its conversion to CRMF.
//!
//! An [`EnrollmentRequest`] wraps a PKCS#10 CSR and the RSA key it was made
//! with. The CSR contributes the subject, public key and requested
//! extensions; the key proves possession by signing the `CertRequest`.

use std::fmt;
use std::time::SystemTime;

use const_oid::db::rfc5280::{
    ID_CE_EXT_KEY_USAGE, ID_CE_KEY_USAGE, ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH,
};
use der::asn1::{BitString, GeneralizedTime, OctetString, UtcTime};
use der::{Decode, Encode};
use rsa::RsaPrivateKey;
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier};
use x509_cert::ext::pkix::{ExtendedKeyUsage, KeyUsage, KeyUsages};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

use crate::error::{CmpError, Result};
use crate::protection::{rsa_public_key, sign_sha256};
use crate::tls::parse_rsa_private_key;
use crate::types::{
    oid, CertReqMsg, CertRequest, CertTemplate, OptionalValidity, PopoSigningKey,
    ProofOfPossession,
};

/// X.509 v3, as encoded in the template `version` field.
const TEMPLATE_VERSION_V3: u8 = 2;

/// A certificate request ready to be sent to a CA.
#[derive(Clone)]
pub struct EnrollmentRequest {
    csr: CertReq,
    private_key: RsaPrivateKey,
    not_before: Option<SystemTime>,
    not_after: Option<SystemTime>,
    key_usage: Option<KeyUsage>,
    extended_key_usage: Option<Vec<ObjectIdentifier>>,
}

impl EnrollmentRequest {
    /// Build a request from a DER CSR and its private key.
    ///
    /// # Errors
    ///
    /// Returns [`CmpError::InvalidRequest`] if the CSR cannot be parsed, its
    /// key is not RSA, or `private_key` does not match it.
    pub fn new(csr_der: &[u8], private_key: RsaPrivateKey) -> Result<Self> {
        let csr = CertReq::from_der(csr_der)
            .map_err(|e| CmpError::invalid_request(format!("Invalid CSR: {e}")))?;

        let csr_key = rsa_public_key(&csr.info.public_key).map_err(|_| {
            CmpError::invalid_request("Only RSA subject keys are supported")
        })?;
        if csr_key != private_key.to_public_key() {
            return Err(CmpError::invalid_request(
                "Private key does not match the CSR public key",
            ));
        }

        Ok(Self {
            csr,
            private_key,
            not_before: None,
            not_after: None,
            key_usage: None,
            extended_key_usage: None,
        })
    }

    /// Build a request from a PEM CSR and a PEM private key (PKCS#8 or PKCS#1).
    pub fn from_pem(csr_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let csr = rustls_pemfile::csr(&mut &csr_pem[..])
            .map_err(|e| CmpError::invalid_request(format!("Failed to parse CSR PEM: {e}")))?
            .ok_or_else(|| CmpError::invalid_request("No CSR found in PEM data"))?;
        let private_key = parse_rsa_private_key(key_pem).map_err(|e| match e {
            CmpError::Configuration(msg) => CmpError::InvalidRequest(msg),
            other => other,
        })?;
        Self::new(csr.as_ref(), private_key)
    }

    /// Request a validity window. Either bound may be left open.
    pub fn with_validity(
        mut self,
        not_before: Option<SystemTime>,
        not_after: Option<SystemTime>,
    ) -> Result<Self> {
        if let (Some(start), Some(end)) = (not_before, not_after) {
            if start > end {
                return Err(CmpError::invalid_request("notBefore is after notAfter"));
            }
        }
        self.not_before = not_before;
        self.not_after = not_after;
        Ok(self)
    }

    /// Key usage to request when the CSR does not carry one.
    pub fn with_key_usage(mut self, key_usage: KeyUsage) -> Self {
        self.key_usage = Some(key_usage);
        self
    }

    /// Extended key usages to request when the CSR does not carry them.
    pub fn with_extended_key_usage(mut self, purposes: Vec<ObjectIdentifier>) -> Self {
        self.extended_key_usage = Some(purposes);
        self
    }

    /// Subject requested by the CSR.
    pub fn subject(&self) -> &Name {
        &self.csr.info.subject
    }

    /// Key whose possession the request proves.
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Build the `CertReqMsg` for `issuer`, signed for proof of possession.
    pub(crate) fn cert_req_msg(&self, cert_req_id: i64, issuer: &Name) -> Result<CertReqMsg> {
        let cert_req = CertRequest {
            cert_req_id,
            cert_template: self.template(issuer)?,
            controls: None,
        };

        let signature = sign_sha256(&self.private_key, &cert_req.to_der()?)
            .map_err(|e| CmpError::invalid_request(format!("Proof of possession failed: {e}")))?;
        let popo = ProofOfPossession::Signature(PopoSigningKey {
            algorithm_identifier: AlgorithmIdentifierOwned {
                oid: oid::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: None,
            },
            signature: BitString::from_bytes(&signature)?,
        });

        Ok(CertReqMsg {
            cert_req,
            popo: Some(popo),
            reg_info: None,
        })
    }

    fn template(&self, issuer: &Name) -> Result<CertTemplate> {
        let validity = if self.not_before.is_some() || self.not_after.is_some() {
            Some(OptionalValidity {
                not_before: self.not_before.map(to_time).transpose()?,
                not_after: self.not_after.map(to_time).transpose()?,
            })
        } else {
            None
        };

        Ok(CertTemplate {
            version: Some(TEMPLATE_VERSION_V3),
            serial_number: Some(SerialNumber::new(&[0])?),
            signing_alg: Some(AlgorithmIdentifierOwned {
                oid: oid::SHA_256_WITH_RSA_ENCRYPTION,
                parameters: None,
            }),
            issuer: Some(issuer.clone()),
            validity,
            subject: Some(self.csr.info.subject.clone()),
            public_key: Some(self.csr.info.public_key.clone()),
            extensions: Some(self.extensions()?),
            ..Default::default()
        })
    }

    /// Extensions from the CSR's extensionRequest, plus key usage defaults.
    fn extensions(&self) -> Result<Vec<Extension>> {
        let mut extensions = Vec::new();
        for attr in self.csr.info.attributes.iter() {
            if attr.oid != oid::ID_EXTENSION_REQ {
                continue;
            }
            for value in attr.values.iter() {
                let requested = Vec::<Extension>::from_der(&value.to_der()?).map_err(|e| {
                    CmpError::invalid_request(format!("Invalid extensionRequest: {e}"))
                })?;
                extensions.extend(requested);
            }
        }

        if !extensions.iter().any(|ext| ext.extn_id == ID_CE_KEY_USAGE) {
            let key_usage = self.key_usage.unwrap_or(KeyUsage(
                KeyUsages::DigitalSignature
                    | KeyUsages::KeyEncipherment
                    | KeyUsages::NonRepudiation,
            ));
            extensions.push(Extension {
                extn_id: ID_CE_KEY_USAGE,
                critical: false,
                extn_value: OctetString::new(key_usage.to_der()?)?,
            });
        }

        if !extensions.iter().any(|ext| ext.extn_id == ID_CE_EXT_KEY_USAGE) {
            let purposes = self
                .extended_key_usage
                .clone()
                .unwrap_or_else(|| vec![ID_KP_CLIENT_AUTH, ID_KP_SERVER_AUTH]);
            extensions.push(Extension {
                extn_id: ID_CE_EXT_KEY_USAGE,
                critical: false,
                extn_value: OctetString::new(ExtendedKeyUsage(purposes).to_der()?)?,
            });
        }

        Ok(extensions)
    }
}

impl fmt::Debug for EnrollmentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentRequest")
            .field("subject", &self.csr.info.subject.to_string())
            .field("private_key", &"*****")
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .finish()
    }
}

/// UTCTime through 2049, GeneralizedTime after (RFC 5280 Section 4.1.2.5).
fn to_time(time: SystemTime) -> Result<Time> {
    match UtcTime::from_system_time(time) {
        Ok(utc) => Ok(Time::UtcTime(utc)),
        Err(_) => Ok(Time::GeneralTime(GeneralizedTime::from_system_time(time)?)),
    }
}
