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

//! Message protection (RFC 4210 Section 5.1.3).
//!
//! A [`ProtectionContext`] is chosen once per enrollment from the CA
//! descriptor. It supplies the header fields that identify the protection
//! (`protectionAlg`, `senderKID`, `extraCerts`), computes the protection bits
//! for outgoing messages and recomputes them for incoming ones.
//!
//! Two contexts exist:
//!
//! - [`SharedSecretProtection`]: PasswordBasedMac keyed by the shared secret.
//! - [`SignatureProtection`]: RSA PKCS#1 v1.5 with the client's credential.

use std::fmt;

use der::asn1::{Any, OctetString};
use der::{Decode, Encode};
use hmac::{Hmac, Mac};
use rand::{Rng, RngCore};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::RsaPublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::{AlgorithmIdentifierOwned, ObjectIdentifier, SubjectPublicKeyInfoOwned};
use x509_cert::name::Name;
use x509_cert::Certificate;

use crate::directory::{Authentication, CaServerDescriptor, ClientCredential};
use crate::error::{CmpError, Result};
use crate::types::{self, oid, PbmParameter, PkiMessage};

/// Length of the random PBM salt.
pub const PBM_SALT_LEN: usize = 16;

/// Highest iteration count accepted from a CA.
pub const PBM_MAX_ITERATIONS: u32 = 100_000;

/// Computes and verifies the protection of CMP messages.
pub trait ProtectionContext: Send + Sync + fmt::Debug {
    /// Algorithm identifier placed in `protectionAlg`.
    fn algorithm(&self) -> Result<AlgorithmIdentifierOwned>;

    /// Value placed in `senderKID`, if any.
    fn sender_kid(&self) -> Option<Vec<u8>>;

    /// Name to use as the header sender. `None` means the request subject.
    fn sender(&self) -> Option<Name>;

    /// Certificates to send in `extraCerts`.
    fn extra_certs(&self) -> Vec<Certificate>;

    /// Protection bits over the DER of `ProtectedPart`.
    fn protect(&self, protected_part: &[u8]) -> Result<Vec<u8>>;

    /// Recompute and check the protection of a received message.
    ///
    /// `algorithm` is the response's own `protectionAlg`; it must belong to
    /// this context's family or the check fails.
    fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        protected_part: &[u8],
        protection: &[u8],
        extra_certs: &[Certificate],
    ) -> Result<()>;
}

/// Select the protection context for a CA.
pub fn for_descriptor(descriptor: &CaServerDescriptor) -> Result<Box<dyn ProtectionContext>> {
    match &descriptor.authentication {
        Authentication::SharedSecret { iak, rv } => {
            Ok(Box::new(SharedSecretProtection::new(iak.as_bytes(), rv.as_bytes())))
        }
        Authentication::Signature(credential) => Ok(Box::new(SignatureProtection::new(
            credential.clone(),
            descriptor,
        )?)),
    }
}

/// Fill in `protectionAlg`, encode `ProtectedPart` and set `protection`.
///
/// The header must otherwise be complete; any later change to it invalidates
/// the protection.
pub fn protect_message(context: &dyn ProtectionContext, message: &mut PkiMessage) -> Result<()> {
    message.header.protection_alg = Some(context.algorithm()?);
    if let Some(kid) = context.sender_kid() {
        message.header.sender_kid = Some(OctetString::new(kid)?);
    }
    let extra_certs = context.extra_certs();
    if !extra_certs.is_empty() {
        message.extra_certs = Some(extra_certs);
    }

    let protected_part = types::protected_part(&message.header, &message.body)?;
    let protection = context.protect(&protected_part)?;
    message.protection = Some(der::asn1::BitString::from_bytes(&protection)?);
    Ok(())
}

/// Verify the protection of a decoded response against its raw bytes.
pub fn verify_message(
    context: &dyn ProtectionContext,
    message: &PkiMessage,
    raw: &[u8],
) -> Result<()> {
    let algorithm = message
        .header
        .protection_alg
        .as_ref()
        .ok_or_else(|| CmpError::protection("response has no protectionAlg"))?;
    let protection = message
        .protection
        .as_ref()
        .ok_or_else(|| CmpError::protection("response is not protected"))?;
    let protection = protection
        .as_bytes()
        .ok_or_else(|| CmpError::protection("protection has unused bits"))?;

    let protected_part = types::protected_part_from_wire(raw)?;
    context.verify(algorithm, &protected_part, protection, message.extra_certs())
}

/// PasswordBasedMac protection.
///
/// The salt and iteration count are chosen once per context, so every
/// message of one enrollment carries the same `PBMParameter`.
#[derive(Clone)]
pub struct SharedSecretProtection {
    secret: Vec<u8>,
    reference: Vec<u8>,
    salt: Vec<u8>,
    iterations: u32,
}

impl SharedSecretProtection {
    /// New context with a random salt and iteration count in `1000..2000`.
    pub fn new(secret: &[u8], reference: &[u8]) -> Self {
        let mut rng = rand::thread_rng();
        let mut salt = vec![0u8; PBM_SALT_LEN];
        rng.fill_bytes(&mut salt);
        let iterations = rng.gen_range(1000..2000);
        Self::with_parameters(secret, reference, salt, iterations)
    }

    /// New context with a fixed salt and iteration count.
    pub fn with_parameters(
        secret: &[u8],
        reference: &[u8],
        salt: Vec<u8>,
        iterations: u32,
    ) -> Self {
        Self {
            secret: secret.to_vec(),
            reference: reference.to_vec(),
            salt,
            iterations,
        }
    }

    fn mac(&self, params: &PbmParameter, data: &[u8]) -> Result<MacInput> {
        let owf = params.owf.oid;
        let mac = params.mac.oid;
        if params.iteration_count == 0 || params.iteration_count > PBM_MAX_ITERATIONS {
            return Err(CmpError::protection(format!(
                "PBM iteration count {} out of range",
                params.iteration_count
            )));
        }

        let salt = params.salt.as_bytes();
        let key = if owf == oid::SHA256 {
            derive_key::<Sha256>(&self.secret, salt, params.iteration_count)
        } else if owf == oid::SHA1 {
            derive_key::<Sha1>(&self.secret, salt, params.iteration_count)
        } else {
            return Err(CmpError::protection(format!("unsupported PBM OWF {owf}")));
        };

        if mac == oid::HMAC_SHA256 {
            Ok(MacInput::Sha256(keyed::<Hmac<Sha256>>(&key, data)?))
        } else if mac == oid::HMAC_SHA1 {
            Ok(MacInput::Sha1(keyed::<Hmac<Sha1>>(&key, data)?))
        } else {
            Err(CmpError::protection(format!("unsupported PBM MAC {mac}")))
        }
    }

    fn parameters(&self) -> Result<PbmParameter> {
        Ok(PbmParameter {
            salt: OctetString::new(self.salt.clone())?,
            owf: AlgorithmIdentifierOwned {
                oid: oid::SHA256,
                parameters: None,
            },
            iteration_count: self.iterations,
            mac: AlgorithmIdentifierOwned {
                oid: oid::HMAC_SHA256,
                parameters: None,
            },
        })
    }
}

impl fmt::Debug for SharedSecretProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecretProtection")
            .field("secret", &"*****")
            .field("reference", &"*****")
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl ProtectionContext for SharedSecretProtection {
    fn algorithm(&self) -> Result<AlgorithmIdentifierOwned> {
        Ok(AlgorithmIdentifierOwned {
            oid: oid::PASSWORD_BASED_MAC,
            parameters: Some(Any::encode_from(&self.parameters()?)?),
        })
    }

    fn sender_kid(&self) -> Option<Vec<u8>> {
        Some(self.reference.clone())
    }

    fn sender(&self) -> Option<Name> {
        None
    }

    fn extra_certs(&self) -> Vec<Certificate> {
        Vec::new()
    }

    fn protect(&self, protected_part: &[u8]) -> Result<Vec<u8>> {
        Ok(self.mac(&self.parameters()?, protected_part)?.finalize())
    }

    fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        protected_part: &[u8],
        protection: &[u8],
        _extra_certs: &[Certificate],
    ) -> Result<()> {
        if algorithm.oid != oid::PASSWORD_BASED_MAC {
            return Err(CmpError::protection(format!(
                "expected PasswordBasedMac protection, got {}",
                algorithm.oid
            )));
        }
        let params = algorithm
            .parameters
            .as_ref()
            .ok_or_else(|| CmpError::protection("PasswordBasedMac without parameters"))?;
        let params = PbmParameter::from_der(&params.to_der()?)
            .map_err(|e| CmpError::protection(format!("invalid PBMParameter: {e}")))?;

        self.mac(&params, protected_part)?.verify(protection)
    }
}

enum MacInput {
    Sha1(Hmac<Sha1>),
    Sha256(Hmac<Sha256>),
}

impl MacInput {
    fn finalize(self) -> Vec<u8> {
        match self {
            Self::Sha1(mac) => mac.finalize().into_bytes().to_vec(),
            Self::Sha256(mac) => mac.finalize().into_bytes().to_vec(),
        }
    }

    fn verify(self, expected: &[u8]) -> Result<()> {
        let result = match self {
            Self::Sha1(mac) => mac.verify_slice(expected),
            Self::Sha256(mac) => mac.verify_slice(expected),
        };
        result.map_err(|_| CmpError::protection("PasswordBasedMac verification failed"))
    }
}

/// OWF applied `iterations` times: `H(secret || salt)`, then `H(previous)`.
fn derive_key<D: Digest>(secret: &[u8], salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut key = D::new().chain_update(secret).chain_update(salt).finalize().to_vec();
    for _ in 1..iterations {
        key = D::digest(&key).to_vec();
    }
    key
}

fn keyed<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Result<M> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|_| CmpError::protection("invalid PBM key length"))?;
    mac.update(data);
    Ok(mac)
}

/// Signature protection with an RSA credential.
///
/// Responses are only trusted when signed by the pinned CA certificate or by
/// an `extraCerts` entry that the pinned certificate issued. Certificates a
/// response carries are never trusted on their own.
#[derive(Clone, Debug)]
pub struct SignatureProtection {
    credential: ClientCredential,
    ca_certificate: Certificate,
}

impl SignatureProtection {
    /// Sign with `credential`; verify responses against the descriptor's
    /// pinned CA certificate.
    ///
    /// # Errors
    ///
    /// Returns [`CmpError::Configuration`] when the descriptor pins no CA
    /// certificate.
    pub fn new(credential: ClientCredential, descriptor: &CaServerDescriptor) -> Result<Self> {
        let ca_certificate = descriptor.ca_certificate.clone().ok_or_else(|| {
            CmpError::configuration(format!(
                "{} has no caCertificate to verify signed responses with",
                descriptor.ca_name
            ))
        })?;
        Ok(Self {
            credential,
            ca_certificate,
        })
    }

    /// Keys that may have signed a response: the pinned certificate's, plus
    /// those of extra certificates it issued.
    fn candidate_keys(&self, extra_certs: &[Certificate]) -> Result<Vec<RsaPublicKey>> {
        let pinned = &self.ca_certificate;
        let pinned_key = certificate_key(pinned)?;
        let issued_by_pinned = extra_certs
            .iter()
            .filter(|cert| cert.tbs_certificate.issuer == pinned.tbs_certificate.subject)
            .filter(|cert| verify_certificate_signature(cert, &pinned_key).is_ok())
            .filter_map(|cert| certificate_key(cert).ok())
            .collect::<Vec<_>>();

        let mut keys = vec![pinned_key];
        keys.extend(issued_by_pinned);
        Ok(keys)
    }
}

impl ProtectionContext for SignatureProtection {
    fn algorithm(&self) -> Result<AlgorithmIdentifierOwned> {
        Ok(AlgorithmIdentifierOwned {
            oid: oid::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        })
    }

    fn sender_kid(&self) -> Option<Vec<u8>> {
        None
    }

    fn sender(&self) -> Option<Name> {
        Some(self.credential.certificate.tbs_certificate.subject.clone())
    }

    fn extra_certs(&self) -> Vec<Certificate> {
        vec![self.credential.certificate.clone()]
    }

    fn protect(&self, protected_part: &[u8]) -> Result<Vec<u8>> {
        sign_sha256(self.credential.private_key(), protected_part)
    }

    fn verify(
        &self,
        algorithm: &AlgorithmIdentifierOwned,
        protected_part: &[u8],
        protection: &[u8],
        extra_certs: &[Certificate],
    ) -> Result<()> {
        if algorithm.oid == oid::PASSWORD_BASED_MAC {
            return Err(CmpError::protection(
                "expected signature protection, got PasswordBasedMac",
            ));
        }

        let keys = self.candidate_keys(extra_certs)?;
        let mut last_error = None;
        for key in &keys {
            match verify_rsa(algorithm.oid, key, protected_part, protection) {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CmpError::protection("signature verification failed")))
    }
}

/// RSA PKCS#1 v1.5 signature with SHA-256.
pub(crate) fn sign_sha256(key: &rsa::RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>> {
    let signer = SigningKey::<Sha256>::new(key.clone());
    let signature = signer
        .try_sign(data)
        .map_err(|e| CmpError::protection(format!("signing failed: {e}")))?;
    Ok(signature.to_vec())
}

/// Verify an RSA PKCS#1 v1.5 signature for one of the sha2 RSA algorithms.
pub(crate) fn verify_rsa(
    algorithm: ObjectIdentifier,
    key: &RsaPublicKey,
    data: &[u8],
    signature: &[u8],
) -> Result<()> {
    let signature = Signature::try_from(signature)
        .map_err(|e| CmpError::protection(format!("malformed signature: {e}")))?;

    let result = if algorithm == oid::SHA_256_WITH_RSA_ENCRYPTION {
        VerifyingKey::<Sha256>::new(key.clone()).verify(data, &signature)
    } else if algorithm == oid::SHA_384_WITH_RSA_ENCRYPTION {
        VerifyingKey::<Sha384>::new(key.clone()).verify(data, &signature)
    } else if algorithm == oid::SHA_512_WITH_RSA_ENCRYPTION {
        VerifyingKey::<Sha512>::new(key.clone()).verify(data, &signature)
    } else {
        return Err(CmpError::protection(format!(
            "unsupported signature algorithm {algorithm}"
        )));
    };

    result.map_err(|_| CmpError::protection("signature verification failed"))
}

/// Check that `cert` was signed by `issuer_key`.
pub(crate) fn verify_certificate_signature(
    cert: &Certificate,
    issuer_key: &RsaPublicKey,
) -> Result<()> {
    let tbs = cert.tbs_certificate.to_der()?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or_else(|| CmpError::protection("certificate signature has unused bits"))?;
    verify_rsa(cert.signature_algorithm.oid, issuer_key, &tbs, signature)
}

pub(crate) fn certificate_key(cert: &Certificate) -> Result<RsaPublicKey> {
    rsa_public_key(&cert.tbs_certificate.subject_public_key_info)
}

/// Decode an RSA public key from a SubjectPublicKeyInfo.
pub fn rsa_public_key(spki: &SubjectPublicKeyInfoOwned) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_der(&spki.to_der()?)
        .map_err(|e| CmpError::protection(format!("not an RSA public key: {e}")))
}
