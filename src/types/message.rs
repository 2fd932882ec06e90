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

//! PKIMessage encoding and decoding.

use der::asn1::{Any, AnyRef, BitString};
use der::{Decode, Encode, Sequence, SliceReader, Tag, Tagged};
use x509_cert::Certificate;

use super::body::PkiBody;
use super::header::PkiHeader;
use crate::error::{CmpError, Result};

/// PKIMessage.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiMessage {
    /// Header.
    pub header: PkiHeader,
    /// Body.
    pub body: PkiBody,
    /// MAC or signature over `ProtectedPart`.
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub protection: Option<BitString>,
    /// Certificates that may help the recipient.
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub extra_certs: Option<Vec<Certificate>>,
}

impl PkiMessage {
    /// Unprotected message.
    pub fn new(header: PkiHeader, body: PkiBody) -> Self {
        Self {
            header,
            body,
            protection: None,
            extra_certs: None,
        }
    }

    /// Extra certificates, empty when absent.
    pub fn extra_certs(&self) -> &[Certificate] {
        self.extra_certs.as_deref().unwrap_or(&[])
    }
}

/// Encode a message to DER.
pub fn encode(message: &PkiMessage) -> Result<Vec<u8>> {
    Ok(message.to_der()?)
}

/// Decode a complete DER message.
///
/// Trailing bytes, truncation and malformed fields are all errors; a
/// partially decoded message is never returned.
pub fn decode(bytes: &[u8]) -> Result<PkiMessage> {
    PkiMessage::from_der(bytes).map_err(|e| CmpError::decode(format!("invalid PKIMessage: {e}")))
}

/// DER of `ProtectedPart ::= SEQUENCE { header, body }` for an outgoing
/// message.
pub fn protected_part(header: &PkiHeader, body: &PkiBody) -> Result<Vec<u8>> {
    let mut content = header.to_der()?;
    content.extend_from_slice(&body.to_der()?);
    Ok(Any::new(Tag::Sequence, content)?.to_der()?)
}

/// DER of `ProtectedPart` taken from the received bytes.
///
/// The header and body TLVs are copied as they arrived rather than
/// re-encoded from the decoded structures, so the protection check covers
/// exactly what the CA sent.
pub fn protected_part_from_wire(bytes: &[u8]) -> Result<Vec<u8>> {
    let outer = AnyRef::from_der(bytes)?;
    if outer.tag() != Tag::Sequence {
        return Err(CmpError::decode("PKIMessage is not a SEQUENCE"));
    }
    let mut reader = SliceReader::new(outer.value())?;
    let header = AnyRef::decode(&mut reader)?;
    let body = AnyRef::decode(&mut reader)?;

    let mut content = header.to_der()?;
    content.extend_from_slice(&body.to_der()?);
    Ok(Any::new(Tag::Sequence, content)?.to_der()?)
}
