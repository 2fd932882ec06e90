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

//! PKIBody and its content types (RFC 4210 Section 5.1.2).
//!
//! PKIBody is a CHOICE of explicitly tagged alternatives. The derive macros
//! cannot express a CHOICE with a catch-all arm, so the codec is written by
//! hand: the outer `[n]` wrapper is read as a raw TLV and its content is
//! decoded according to `n`. Alternatives this client never handles are kept
//! as [`PkiBody::Unsupported`] with their content bytes intact.

use der::asn1::{Any, AnyRef, Null, OctetString};
use der::{
    Decode, Encode, EncodeValue, Length, Reader, Sequence, Tag, TagNumber, Tagged, Writer,
};
use x509_cert::Certificate;

use super::crmf::CertReqMessages;
use super::status::PkiStatusInfo;

/// Body tag numbers.
pub mod tags {
    /// Initialization request.
    pub const IR: u8 = 0;
    /// Initialization response.
    pub const IP: u8 = 1;
    /// Certification request.
    pub const CR: u8 = 2;
    /// Certification response.
    pub const CP: u8 = 3;
    /// Key update request.
    pub const KUR: u8 = 7;
    /// Key update response.
    pub const KUP: u8 = 8;
    /// Confirmation.
    pub const PKICONF: u8 = 19;
    /// Error message.
    pub const ERROR: u8 = 23;
    /// Certificate confirmation.
    pub const CERT_CONF: u8 = 24;
    /// Polling request.
    pub const POLL_REQ: u8 = 25;
    /// Polling response.
    pub const POLL_REP: u8 = 26;
}

/// The message body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PkiBody {
    /// `ir`
    InitRequest(CertReqMessages),
    /// `ip`
    InitResponse(CertRepMessage),
    /// `cr`
    CertRequest(CertReqMessages),
    /// `cp`
    CertResponse(CertRepMessage),
    /// `kur`
    KeyUpdateRequest(CertReqMessages),
    /// `kup`
    KeyUpdateResponse(CertRepMessage),
    /// `pkiconf`
    PkiConfirm,
    /// `error`
    ErrorMsg(ErrorMsgContent),
    /// `certConf`
    CertConfirm(CertConfirmContent),
    /// `pollReq`
    PollRequest(PollReqContent),
    /// `pollRep`
    PollResponse(PollRepContent),
    /// Any other alternative, kept undecoded.
    Unsupported {
        /// Context tag number of the alternative.
        tag: u8,
        /// DER of the alternative's content.
        content: Vec<u8>,
    },
}

impl PkiBody {
    /// Context tag number of this alternative.
    pub fn tag_number(&self) -> u8 {
        match self {
            Self::InitRequest(_) => tags::IR,
            Self::InitResponse(_) => tags::IP,
            Self::CertRequest(_) => tags::CR,
            Self::CertResponse(_) => tags::CP,
            Self::KeyUpdateRequest(_) => tags::KUR,
            Self::KeyUpdateResponse(_) => tags::KUP,
            Self::PkiConfirm => tags::PKICONF,
            Self::ErrorMsg(_) => tags::ERROR,
            Self::CertConfirm(_) => tags::CERT_CONF,
            Self::PollRequest(_) => tags::POLL_REQ,
            Self::PollResponse(_) => tags::POLL_REP,
            Self::Unsupported { tag, .. } => *tag,
        }
    }

    /// Short RFC name of this alternative, for logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InitRequest(_) => "ir",
            Self::InitResponse(_) => "ip",
            Self::CertRequest(_) => "cr",
            Self::CertResponse(_) => "cp",
            Self::KeyUpdateRequest(_) => "kur",
            Self::KeyUpdateResponse(_) => "kup",
            Self::PkiConfirm => "pkiconf",
            Self::ErrorMsg(_) => "error",
            Self::CertConfirm(_) => "certConf",
            Self::PollRequest(_) => "pollReq",
            Self::PollResponse(_) => "pollRep",
            Self::Unsupported { .. } => "unsupported",
        }
    }

    /// The CertRepMessage of ip, cp or kup.
    pub fn cert_rep(&self) -> Option<&CertRepMessage> {
        match self {
            Self::InitResponse(rep) | Self::CertResponse(rep) | Self::KeyUpdateResponse(rep) => {
                Some(rep)
            }
            _ => None,
        }
    }

    /// The CertReqMessages of ir, cr or kur.
    pub fn cert_req_messages(&self) -> Option<&CertReqMessages> {
        match self {
            Self::InitRequest(msgs) | Self::CertRequest(msgs) | Self::KeyUpdateRequest(msgs) => {
                Some(msgs)
            }
            _ => None,
        }
    }

    fn content_der(&self) -> der::Result<Vec<u8>> {
        match self {
            Self::InitRequest(msgs) | Self::CertRequest(msgs) | Self::KeyUpdateRequest(msgs) => {
                msgs.to_der()
            }
            Self::InitResponse(rep) | Self::CertResponse(rep) | Self::KeyUpdateResponse(rep) => {
                rep.to_der()
            }
            Self::PkiConfirm => Null.to_der(),
            Self::ErrorMsg(content) => content.to_der(),
            Self::CertConfirm(content) => content.to_der(),
            Self::PollRequest(content) => content.to_der(),
            Self::PollResponse(content) => content.to_der(),
            Self::Unsupported { content, .. } => Ok(content.clone()),
        }
    }
}

impl<'a> Decode<'a> for PkiBody {
    fn decode<R: Reader<'a>>(reader: &mut R) -> der::Result<Self> {
        let (number, inner) = decode_explicit_choice(reader)?;
        let inner = inner.value();
        Ok(match number {
            tags::IR => Self::InitRequest(CertReqMessages::from_der(inner)?),
            tags::IP => Self::InitResponse(CertRepMessage::from_der(inner)?),
            tags::CR => Self::CertRequest(CertReqMessages::from_der(inner)?),
            tags::CP => Self::CertResponse(CertRepMessage::from_der(inner)?),
            tags::KUR => Self::KeyUpdateRequest(CertReqMessages::from_der(inner)?),
            tags::KUP => Self::KeyUpdateResponse(CertRepMessage::from_der(inner)?),
            tags::PKICONF => {
                Null::from_der(inner)?;
                Self::PkiConfirm
            }
            tags::ERROR => Self::ErrorMsg(ErrorMsgContent::from_der(inner)?),
            tags::CERT_CONF => Self::CertConfirm(CertConfirmContent::from_der(inner)?),
            tags::POLL_REQ => Self::PollRequest(PollReqContent::from_der(inner)?),
            tags::POLL_REP => Self::PollResponse(PollRepContent::from_der(inner)?),
            tag => Self::Unsupported {
                tag,
                content: inner.to_vec(),
            },
        })
    }
}

impl EncodeValue for PkiBody {
    fn value_len(&self) -> der::Result<Length> {
        Length::try_from(self.content_der()?.len())
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        writer.write(&self.content_der()?)
    }
}

impl Tagged for PkiBody {
    fn tag(&self) -> Tag {
        explicit_tag(self.tag_number())
    }
}

/// Read `[n] { inner }` and return `n` with the raw wrapper.
fn decode_explicit_choice<'a, R: Reader<'a>>(reader: &mut R) -> der::Result<(u8, AnyRef<'a>)> {
    let any = AnyRef::decode(reader)?;
    match any.tag() {
        Tag::ContextSpecific {
            constructed: true,
            number,
        } => Ok((number.value(), any)),
        tag => Err(tag.unexpected_error(None)),
    }
}

fn explicit_tag(number: u8) -> Tag {
    Tag::ContextSpecific {
        constructed: true,
        number: TagNumber::new(number),
    }
}

/// CertRepMessage (ip, cp, kup).
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertRepMessage {
    /// CA certificates the CA wants the end entity to trust.
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub ca_pubs: Option<Vec<Certificate>>,
    /// One response per request.
    pub response: Vec<CertResponse>,
}

/// CertResponse.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertResponse {
    /// Matches the certReqId of the request.
    pub cert_req_id: i64,
    /// Outcome of the request.
    pub status: PkiStatusInfo,
    /// The issued certificate, when granted.
    pub certified_key_pair: Option<CertifiedKeyPair>,
    /// Additional response information.
    pub rsp_info: Option<OctetString>,
}

/// CertifiedKeyPair.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertifiedKeyPair {
    /// The certificate, plain or encrypted.
    pub cert_or_enc_cert: CertOrEncCert,
    /// Private key generated by the CA (not used by this client).
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub private_key: Option<Any>,
    /// Publication information.
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub publication_info: Option<Any>,
}

/// CertOrEncCert.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertOrEncCert {
    /// `[0] CMPCertificate`
    Certificate(Box<Certificate>),
    /// `[1] EncryptedKey`, kept undecoded.
    EncryptedCert(Any),
}

impl CertOrEncCert {
    fn inner_der(&self) -> der::Result<Vec<u8>> {
        match self {
            Self::Certificate(cert) => cert.to_der(),
            Self::EncryptedCert(any) => any.to_der(),
        }
    }
}

impl<'a> Decode<'a> for CertOrEncCert {
    fn decode<R: Reader<'a>>(reader: &mut R) -> der::Result<Self> {
        let (number, inner) = decode_explicit_choice(reader)?;
        match number {
            0 => Ok(Self::Certificate(Box::new(Certificate::from_der(
                inner.value(),
            )?))),
            1 => Ok(Self::EncryptedCert(Any::from_der(inner.value())?)),
            _ => Err(inner.tag().unexpected_error(None)),
        }
    }
}

impl EncodeValue for CertOrEncCert {
    fn value_len(&self) -> der::Result<Length> {
        Length::try_from(self.inner_der()?.len())
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        writer.write(&self.inner_der()?)
    }
}

impl Tagged for CertOrEncCert {
    fn tag(&self) -> Tag {
        match self {
            Self::Certificate(_) => explicit_tag(0),
            Self::EncryptedCert(_) => explicit_tag(1),
        }
    }
}

/// ErrorMsgContent.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct ErrorMsgContent {
    /// Status of the failed transaction.
    pub pki_status_info: PkiStatusInfo,
    /// Implementation-specific error code.
    pub error_code: Option<i64>,
    /// Implementation-specific details.
    pub error_details: Option<Vec<String>>,
}

/// CertConfirmContent.
pub type CertConfirmContent = Vec<CertStatus>;

/// CertStatus.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertStatus {
    /// Hash of the certificate being confirmed.
    pub cert_hash: OctetString,
    /// Request the certificate answered.
    pub cert_req_id: i64,
    /// Absent means accepted.
    pub status_info: Option<PkiStatusInfo>,
}

/// PollReqContent.
pub type PollReqContent = Vec<PollReqEntry>;

/// One entry of PollReqContent.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PollReqEntry {
    /// Request being polled.
    pub cert_req_id: i64,
}

/// PollRepContent.
pub type PollRepContent = Vec<PollRepEntry>;

/// One entry of PollRepContent.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PollRepEntry {
    /// Request being polled.
    pub cert_req_id: i64,
    /// Seconds to wait before polling again.
    pub check_after: i64,
    /// Why the request is still pending.
    pub reason: Option<Vec<String>>,
}
