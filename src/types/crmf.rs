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

//! Certificate Request Message Format (RFC 4211).
//!
//! The CRMF module uses IMPLICIT tags. `Name` and `Time` are CHOICE types,
//! so fields of those types are still explicitly tagged.

use const_oid::ObjectIdentifier;
use der::asn1::{Any, BitString, Null};
use der::{Choice, Sequence};
use spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::ext::Extensions;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Time;

/// CertReqMessages.
pub type CertReqMessages = Vec<CertReqMsg>;

/// CertReqMsg.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertReqMsg {
    /// The request.
    pub cert_req: CertRequest,
    /// Proof of possession of the private key.
    pub popo: Option<ProofOfPossession>,
    /// Registration information.
    pub reg_info: Option<Vec<AttributeTypeAndValue>>,
}

/// CertRequest.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertRequest {
    /// Matches this request to its response.
    pub cert_req_id: i64,
    /// Fields of the certificate being requested.
    pub cert_template: CertTemplate,
    /// Controls (e.g. regToken).
    pub controls: Option<Vec<AttributeTypeAndValue>>,
}

/// CertTemplate. Every field is optional.
#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
pub struct CertTemplate {
    /// Requested certificate version.
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub version: Option<u8>,
    /// Requested serial number (normally left to the CA).
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub serial_number: Option<SerialNumber>,
    /// Requested signature algorithm.
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT", optional = "true")]
    pub signing_alg: Option<AlgorithmIdentifierOwned>,
    /// Issuer the request is addressed to.
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", optional = "true")]
    pub issuer: Option<Name>,
    /// Requested validity window.
    #[asn1(context_specific = "4", tag_mode = "IMPLICIT", optional = "true")]
    pub validity: Option<OptionalValidity>,
    /// Requested subject.
    #[asn1(context_specific = "5", tag_mode = "EXPLICIT", optional = "true")]
    pub subject: Option<Name>,
    /// Public key to certify.
    #[asn1(context_specific = "6", tag_mode = "IMPLICIT", optional = "true")]
    pub public_key: Option<SubjectPublicKeyInfoOwned>,
    /// Issuer unique identifier.
    #[asn1(context_specific = "7", tag_mode = "IMPLICIT", optional = "true")]
    pub issuer_uid: Option<BitString>,
    /// Subject unique identifier.
    #[asn1(context_specific = "8", tag_mode = "IMPLICIT", optional = "true")]
    pub subject_uid: Option<BitString>,
    /// Requested extensions.
    #[asn1(context_specific = "9", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Extensions>,
}

/// OptionalValidity: at least one bound should be present.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct OptionalValidity {
    /// Start of the requested validity.
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub not_before: Option<Time>,
    /// End of the requested validity.
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub not_after: Option<Time>,
}

/// ProofOfPossession.
///
/// Only the raVerified and signature alternatives are modelled; the
/// key-encipherment and key-agreement alternatives do not apply to signing
/// keys.
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
pub enum ProofOfPossession {
    /// The RA verified possession out of band.
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    RaVerified(Null),
    /// Signature by the key being certified.
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Signature(PopoSigningKey),
}

/// POPOSigningKey without poposkInput: the signature covers the DER of the
/// enclosing `CertRequest`.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PopoSigningKey {
    /// Signature algorithm.
    pub algorithm_identifier: AlgorithmIdentifierOwned,
    /// Signature value.
    pub signature: BitString,
}

/// AttributeTypeAndValue as used by controls and regInfo.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct AttributeTypeAndValue {
    /// Attribute type.
    pub attr_type: ObjectIdentifier,
    /// Attribute value.
    pub value: Any,
}
