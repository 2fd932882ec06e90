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

//! CMP message types and wire codec.
//!
//! This module models the parts of RFC 4210 (CMP) and RFC 4211 (CRMF) used
//! by an end entity: the PKIMessage envelope, the request, response, polling
//! and confirmation bodies, and PKIStatusInfo.

pub mod body;
pub mod crmf;
pub mod header;
pub mod message;
mod model;
pub mod status;

pub use body::{
    CertConfirmContent, CertOrEncCert, CertRepMessage, CertResponse, CertStatus,
    CertifiedKeyPair, ErrorMsgContent, PkiBody, PollRepContent, PollRepEntry, PollReqContent,
    PollReqEntry,
};
pub use crmf::{
    CertReqMessages, CertReqMsg, CertRequest, CertTemplate, OptionalValidity, PopoSigningKey,
    ProofOfPossession,
};
pub use header::{InfoTypeAndValue, PbmParameter, PkiHeader};
pub use message::{decode, encode, protected_part, protected_part_from_wire, PkiMessage};
pub use model::Cmpv2CertificationModel;
pub use status::{PkiFailureInfo, PkiStatus, PkiStatusInfo};

/// Object identifiers used by the CMP client.
pub mod oid {
    use const_oid::ObjectIdentifier;

    pub use const_oid::db::rfc5912::{
        ID_EXTENSION_REQ, SHA_256_WITH_RSA_ENCRYPTION, SHA_384_WITH_RSA_ENCRYPTION,
        SHA_512_WITH_RSA_ENCRYPTION,
    };

    /// PasswordBasedMac (RFC 4211 Section 4.4).
    pub const PASSWORD_BASED_MAC: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113533.7.66.13");

    /// id-it-implicitConfirm (RFC 4210 Section 5.1.1.1).
    pub const IMPLICIT_CONFIRM: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.4.13");

    /// SHA-1.
    pub const SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

    /// SHA-256.
    pub const SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

    /// HMAC-SHA1 (RFC 2404).
    pub const HMAC_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.5.5.8.1.2");

    /// HMAC-SHA256 (RFC 4231).
    pub const HMAC_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.2.9");

    /// sha1WithRSAEncryption.
    pub const SHA_1_WITH_RSA_ENCRYPTION: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5");

    /// ecdsa-with-SHA1.
    pub const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

    /// ecdsa-with-SHA384.
    pub const ECDSA_WITH_SHA384: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");

    /// ecdsa-with-SHA512.
    pub const ECDSA_WITH_SHA512: ObjectIdentifier =
        ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
}

/// Content types used by CMP over HTTP (RFC 6712).
pub mod content_types {
    /// PKIMessage content type.
    pub const PKIXCMP: &str = "application/pkixcmp";
}
