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

//! PKIHeader and the small structures that hang off it.

use const_oid::ObjectIdentifier;
use der::asn1::{Any, GeneralizedTime, OctetString};
use der::Sequence;
use spki::AlgorithmIdentifierOwned;
use x509_cert::ext::pkix::name::GeneralName;

use super::oid;

/// `pvno` value for CMPv2 (cmp2000).
pub const PVNO_CMP2000: u8 = 2;

/// PKIHeader (RFC 4210 Section 5.1.1).
///
/// All tagged fields are explicitly tagged and optional.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiHeader {
    /// Protocol version.
    pub pvno: u8,
    /// Sender name.
    pub sender: GeneralName,
    /// Intended recipient name.
    pub recipient: GeneralName,
    /// Time of production of this message.
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub message_time: Option<GeneralizedTime>,
    /// Algorithm used for the protection bits.
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub protection_alg: Option<AlgorithmIdentifierOwned>,
    /// Sender key identifier (the reference value for MAC protection).
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub sender_kid: Option<OctetString>,
    /// Recipient key identifier.
    #[asn1(context_specific = "3", tag_mode = "EXPLICIT", optional = "true")]
    pub recip_kid: Option<OctetString>,
    /// Identifies the transaction.
    #[asn1(context_specific = "4", tag_mode = "EXPLICIT", optional = "true")]
    pub transaction_id: Option<OctetString>,
    /// Nonce chosen by the sender.
    #[asn1(context_specific = "5", tag_mode = "EXPLICIT", optional = "true")]
    pub sender_nonce: Option<OctetString>,
    /// Echo of the recipient's last sender nonce.
    #[asn1(context_specific = "6", tag_mode = "EXPLICIT", optional = "true")]
    pub recip_nonce: Option<OctetString>,
    /// PKIFreeText.
    #[asn1(context_specific = "7", tag_mode = "EXPLICIT", optional = "true")]
    pub free_text: Option<Vec<String>>,
    /// Generic information (e.g. implicitConfirm).
    #[asn1(context_specific = "8", tag_mode = "EXPLICIT", optional = "true")]
    pub general_info: Option<Vec<InfoTypeAndValue>>,
}

impl PkiHeader {
    /// A cmp2000 header with only sender and recipient set.
    pub fn new(sender: GeneralName, recipient: GeneralName) -> Self {
        Self {
            pvno: PVNO_CMP2000,
            sender,
            recipient,
            message_time: None,
            protection_alg: None,
            sender_kid: None,
            recip_kid: None,
            transaction_id: None,
            sender_nonce: None,
            recip_nonce: None,
            free_text: None,
            general_info: None,
        }
    }

    /// Returns true if `generalInfo` carries the implicitConfirm ITAV.
    pub fn has_implicit_confirm(&self) -> bool {
        self.general_info
            .iter()
            .flatten()
            .any(|itav| itav.info_type == oid::IMPLICIT_CONFIRM)
    }
}

/// InfoTypeAndValue.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct InfoTypeAndValue {
    /// Info type.
    pub info_type: ObjectIdentifier,
    /// Info value.
    pub info_value: Option<Any>,
}

impl InfoTypeAndValue {
    /// The implicitConfirm ITAV (value NULL).
    pub fn implicit_confirm() -> der::Result<Self> {
        Ok(Self {
            info_type: oid::IMPLICIT_CONFIRM,
            info_value: Some(Any::new(der::Tag::Null, Vec::<u8>::new())?),
        })
    }
}

/// PBMParameter (RFC 4211 Section 4.4), the parameters of PasswordBasedMac.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PbmParameter {
    /// Random salt appended to the shared secret.
    pub salt: OctetString,
    /// One-way function used to derive the key.
    pub owf: AlgorithmIdentifierOwned,
    /// Number of times the OWF is applied.
    pub iteration_count: u32,
    /// MAC algorithm.
    pub mac: AlgorithmIdentifierOwned,
}
