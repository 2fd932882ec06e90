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

//! PKIStatusInfo (RFC 4210 Section 5.2.3).

use std::fmt;

use der::asn1::BitString;
use der::{Enumerated, Sequence};

/// PKIStatus values.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Enumerated)]
#[asn1(type = "INTEGER")]
#[repr(u8)]
pub enum PkiStatus {
    /// The request was granted as submitted.
    Accepted = 0,
    /// The request was granted with modifications.
    GrantedWithMods = 1,
    /// The request was refused.
    Rejection = 2,
    /// The request is not yet processed; poll later.
    Waiting = 3,
    /// A revocation is imminent.
    RevocationWarning = 4,
    /// A revocation has occurred.
    RevocationNotification = 5,
    /// A key update has already been done.
    KeyUpdateWarning = 6,
}

impl PkiStatus {
    /// Returns true when the CA granted the request.
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Accepted | Self::GrantedWithMods)
    }
}

impl fmt::Display for PkiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "accepted",
            Self::GrantedWithMods => "grantedWithMods",
            Self::Rejection => "rejection",
            Self::Waiting => "waiting",
            Self::RevocationWarning => "revocationWarning",
            Self::RevocationNotification => "revocationNotification",
            Self::KeyUpdateWarning => "keyUpdateWarning",
        };
        f.write_str(name)
    }
}

const FAILURE_NAMES: [&str; 27] = [
    "badAlg",
    "badMessageCheck",
    "badRequest",
    "badTime",
    "badCertId",
    "badDataFormat",
    "wrongAuthority",
    "incorrectData",
    "missingTimeStamp",
    "badPOP",
    "certRevoked",
    "certConfirmed",
    "wrongIntegrity",
    "badRecipientNonce",
    "timeNotAvailable",
    "unacceptedPolicy",
    "unacceptedExtension",
    "addInfoNotAvailable",
    "badSenderNonce",
    "badCertTemplate",
    "signerNotTrusted",
    "transactionIdInUse",
    "unsupportedVersion",
    "notAuthorized",
    "systemUnavail",
    "systemFailure",
    "duplicateCertReq",
];

/// Raw PKIFailureInfo bits.
///
/// Bit `n` of the value is named bit `n` of the ASN.1 BIT STRING. Bits the
/// CA sets beyond the RFC 4210 list are kept; only the first 32 are
/// representable.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct PkiFailureInfo(u32);

impl PkiFailureInfo {
    /// badMessageCheck: integrity check failed.
    pub const BAD_MESSAGE_CHECK: u32 = 1 << 1;
    /// badRequest: transaction not permitted or supported.
    pub const BAD_REQUEST: u32 = 1 << 2;
    /// badPOP: proof of possession failed.
    pub const BAD_POP: u32 = 1 << 9;
    /// systemFailure: the CA failed internally.
    pub const SYSTEM_FAILURE: u32 = 1 << 25;

    /// Wrap raw bits.
    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bits.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns true when no bit is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true when any bit of `mask` is set.
    pub fn contains(self, mask: u32) -> bool {
        self.0 & mask != 0
    }

    /// Read the bits out of a DER BIT STRING.
    pub fn from_bit_string(bits: &BitString) -> Self {
        let bytes = bits.raw_bytes();
        let len = bits.bit_len().min(32);
        let mut value = 0u32;
        for i in 0..len {
            if bytes[i / 8] & (0x80 >> (i % 8)) != 0 {
                value |= 1 << i;
            }
        }
        Self(value)
    }

    /// Encode as a named-bit BIT STRING (trailing zero bits removed).
    pub fn to_bit_string(self) -> der::Result<BitString> {
        if self.0 == 0 {
            return BitString::new(0, Vec::<u8>::new());
        }
        let len = 32 - self.0.leading_zeros() as usize;
        let mut bytes = vec![0u8; len.div_ceil(8)];
        for i in 0..len {
            if self.0 & (1 << i) != 0 {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        let unused = (bytes.len() * 8 - len) as u8;
        BitString::new(unused, bytes)
    }
}

impl fmt::Display for PkiFailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for bit in 0..32u32 {
            if self.0 & (1 << bit) == 0 {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match FAILURE_NAMES.get(bit as usize) {
                Some(name) => f.write_str(name)?,
                None => write!(f, "bit{bit}")?,
            }
        }
        Ok(())
    }
}

/// PKIStatusInfo.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct PkiStatusInfo {
    /// Status.
    pub status: PkiStatus,
    /// PKIFreeText.
    pub status_string: Option<Vec<String>>,
    /// PKIFailureInfo.
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    /// Status info with the given status and nothing else.
    pub fn new(status: PkiStatus) -> Self {
        Self {
            status,
            status_string: None,
            fail_info: None,
        }
    }

    /// Status info describing a rejection.
    pub fn rejection(fail_info: PkiFailureInfo, text: impl Into<String>) -> der::Result<Self> {
        Ok(Self {
            status: PkiStatus::Rejection,
            status_string: Some(vec![text.into()]),
            fail_info: Some(fail_info.to_bit_string()?),
        })
    }

    /// Decoded failure bits, if present.
    pub fn failure_info(&self) -> Option<PkiFailureInfo> {
        self.fail_info.as_ref().map(PkiFailureInfo::from_bit_string)
    }

    /// Free text, empty when absent.
    pub fn texts(&self) -> Vec<String> {
        self.status_string.clone().unwrap_or_default()
    }
}
