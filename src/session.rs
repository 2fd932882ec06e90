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

//! Per-enrollment transaction state.
//!
//! One [`EnrollmentSession`] lives for exactly one enrollment call. It owns
//! the transaction identifier and nonces, so two calls can never share them
//! and a finished exchange can never be resumed.

use std::fmt;
use std::time::SystemTime;

use der::asn1::{GeneralizedTime, OctetString};
use rand::{Rng, RngCore};
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use crate::error::Result;
use crate::protection::{protect_message, ProtectionContext};
use crate::types::{InfoTypeAndValue, PkiBody, PkiHeader, PkiMessage};

/// Length of the transaction identifier and sender nonce.
pub const NONCE_LEN: usize = 16;

/// Enrollment state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Request being built.
    Building,
    /// Certificate request sent, waiting for the response.
    Sent,
    /// CA answered "waiting"; deciding whether to poll.
    AwaitingPollDecision,
    /// PollRequest sent.
    Polling,
    /// certConf sent, waiting for pkiconf.
    Confirming,
    /// Certificate issued and confirmed.
    Done,
    /// Terminal failure.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Building => "BUILDING",
            Self::Sent => "SENT",
            Self::AwaitingPollDecision => "AWAITING_POLL_DECISION",
            Self::Polling => "POLLING",
            Self::Confirming => "CONFIRMING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Identifiers, nonces and state of one enrollment.
pub struct EnrollmentSession {
    transaction_id: Vec<u8>,
    sender_nonce: Vec<u8>,
    recip_nonce: Option<Vec<u8>>,
    cert_req_id: i64,
    sender: Name,
    recipient: Name,
    implicit_confirm: bool,
    protection: Box<dyn ProtectionContext>,
    state: SessionState,
    polls: u32,
}

impl EnrollmentSession {
    /// Start a session with fresh random identifiers.
    pub fn new(
        protection: Box<dyn ProtectionContext>,
        sender: Name,
        recipient: Name,
        implicit_confirm: bool,
    ) -> Self {
        let mut rng = rand::thread_rng();
        let mut transaction_id = vec![0u8; NONCE_LEN];
        rng.fill_bytes(&mut transaction_id);
        let mut sender_nonce = vec![0u8; NONCE_LEN];
        rng.fill_bytes(&mut sender_nonce);

        Self {
            transaction_id,
            sender_nonce,
            recip_nonce: None,
            cert_req_id: rng.gen_range(0..i64::from(i32::MAX)),
            sender,
            recipient,
            implicit_confirm,
            protection,
            state: SessionState::Building,
            polls: 0,
        }
    }

    /// Transaction identifier sent in every message of this session.
    pub fn transaction_id(&self) -> &[u8] {
        &self.transaction_id
    }

    /// Sender nonce sent in every message of this session.
    pub fn sender_nonce(&self) -> &[u8] {
        &self.sender_nonce
    }

    /// `certReqId` of the single request in this session.
    pub fn cert_req_id(&self) -> i64 {
        self.cert_req_id
    }

    /// Whether implicit confirmation was requested.
    pub fn implicit_confirm(&self) -> bool {
        self.implicit_confirm
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of PollRequests sent so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub(crate) fn protection(&self) -> &dyn ProtectionContext {
        self.protection.as_ref()
    }

    /// Move to `next`.
    pub(crate) fn transition(&mut self, next: SessionState) {
        tracing::debug!("CMP session {} -> {}", self.state, next);
        if next == SessionState::Polling {
            self.polls += 1;
        }
        self.state = next;
    }

    /// Remember the CA's sender nonce for the next `recipNonce`.
    pub(crate) fn record_response(&mut self, header: &PkiHeader) {
        if let Some(nonce) = &header.sender_nonce {
            self.recip_nonce = Some(nonce.as_bytes().to_vec());
        }
    }

    /// Build and protect the next outgoing message.
    pub(crate) fn message(&self, body: PkiBody) -> Result<PkiMessage> {
        let mut message = PkiMessage::new(self.header(&body)?, body);
        protect_message(self.protection.as_ref(), &mut message)?;
        Ok(message)
    }

    fn header(&self, body: &PkiBody) -> Result<PkiHeader> {
        let mut header = PkiHeader::new(
            GeneralName::DirectoryName(self.sender.clone()),
            GeneralName::DirectoryName(self.recipient.clone()),
        );
        header.message_time = Some(GeneralizedTime::from_system_time(SystemTime::now())?);
        header.transaction_id = Some(OctetString::new(self.transaction_id.clone())?);
        header.sender_nonce = Some(OctetString::new(self.sender_nonce.clone())?);
        if let Some(nonce) = &self.recip_nonce {
            header.recip_nonce = Some(OctetString::new(nonce.clone())?);
        }
        if self.implicit_confirm && body.cert_req_messages().is_some() {
            header.general_info = Some(vec![InfoTypeAndValue::implicit_confirm()?]);
        }
        Ok(header)
    }
}

impl fmt::Debug for EnrollmentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentSession")
            .field("cert_req_id", &self.cert_req_id)
            .field("state", &self.state)
            .field("polls", &self.polls)
            .field("protection", &self.protection)
            .finish()
    }
}
