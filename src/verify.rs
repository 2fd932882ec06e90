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

//! Response verification and certificate extraction.
//!
//! Every response passes the same checks, in order:
//!
//! 1. `transactionID` equals the session's.
//! 2. `recipNonce` equals the session's sender nonce.
//! 3. The protection recomputed from the received bytes matches.
//! 4. The body is one the current state expects, and its PKIStatus is not a
//!    rejection.
//!
//! The first failing check decides the error. An ErrorMsg body is terminal:
//! it still has to belong to the session when it names one, but it is not
//! required to be protected, since a CA that could not authenticate the
//! request often cannot protect its answer either.

use std::collections::HashSet;

use der::Encode;
use x509_cert::Certificate;

use crate::error::{CmpError, Result};
use crate::protection::{certificate_key, verify_certificate_signature, verify_message};
use crate::session::{EnrollmentSession, SessionState};
use crate::types::{
    CertOrEncCert, CertRepMessage, Cmpv2CertificationModel, ErrorMsgContent, PkiBody, PkiMessage,
    PkiStatus, PkiStatusInfo,
};

/// Outcome of a response that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifiedResponse {
    /// The certificate was issued.
    Issued {
        /// The issued certificate.
        certificate: Box<Certificate>,
        /// caPubs followed by extraCerts, de-duplicated, in order received.
        ca_certificates: Vec<Certificate>,
        /// Whether the CA granted implicit confirmation.
        implicit_confirm_granted: bool,
    },
    /// Not ready yet.
    Waiting {
        /// Seconds the CA asked to wait, when it said.
        check_after: Option<i64>,
    },
    /// The CA acknowledged the certConf.
    Confirmed,
}

/// Verify `message` (decoded from `raw`) against `session`.
///
/// `expected` is the tag of the certificate response that answers the
/// session's request (ip, cp or kup).
pub fn verify_response(
    session: &EnrollmentSession,
    message: &PkiMessage,
    raw: &[u8],
    expected: u8,
) -> Result<VerifiedResponse> {
    if let PkiBody::ErrorMsg(content) = &message.body {
        check_identifiers(session, message, true)?;
        return Err(error_from_msg(content));
    }

    check_identifiers(session, message, false)?;
    verify_message(session.protection(), message, raw)?;

    match (session.state(), &message.body) {
        (SessionState::Sent | SessionState::Polling, body) if body.tag_number() == expected => {
            let rep = body
                .cert_rep()
                .ok_or_else(|| unexpected(body, session.state()))?;
            check_cert_rep(session, message, rep)
        }
        (SessionState::Polling, PkiBody::PollResponse(entries)) => {
            let entry = entries
                .iter()
                .find(|entry| entry.cert_req_id == session.cert_req_id())
                .ok_or_else(|| {
                    CmpError::decode(format!(
                        "pollRep has no entry for certReqId {}",
                        session.cert_req_id()
                    ))
                })?;
            Ok(VerifiedResponse::Waiting {
                check_after: Some(entry.check_after),
            })
        }
        (SessionState::Confirming, PkiBody::PkiConfirm) => Ok(VerifiedResponse::Confirmed),
        (state, body) => Err(unexpected(body, state)),
    }
}

/// Checks (a) and (b). With `lenient`, absent fields are accepted.
fn check_identifiers(
    session: &EnrollmentSession,
    message: &PkiMessage,
    lenient: bool,
) -> Result<()> {
    let header = &message.header;

    match &header.transaction_id {
        Some(id) if id.as_bytes() == session.transaction_id() => {}
        None if lenient => {}
        Some(_) => {
            return Err(CmpError::nonce_mismatch(
                "transactionID does not match the request",
            ))
        }
        None => return Err(CmpError::nonce_mismatch("response has no transactionID")),
    }

    match &header.recip_nonce {
        Some(nonce) if nonce.as_bytes() == session.sender_nonce() => Ok(()),
        None if lenient => Ok(()),
        Some(_) => Err(CmpError::nonce_mismatch(
            "recipNonce does not echo the sender nonce",
        )),
        None => Err(CmpError::nonce_mismatch("response has no recipNonce")),
    }
}

/// Check (d) for a certificate response.
fn check_cert_rep(
    session: &EnrollmentSession,
    message: &PkiMessage,
    rep: &CertRepMessage,
) -> Result<VerifiedResponse> {
    let response = rep
        .response
        .iter()
        .find(|r| r.cert_req_id == session.cert_req_id())
        .ok_or_else(|| {
            CmpError::decode(format!(
                "response has no entry for certReqId {}",
                session.cert_req_id()
            ))
        })?;

    match response.status.status {
        PkiStatus::Waiting => return Ok(VerifiedResponse::Waiting { check_after: None }),
        status if status.is_granted() => {}
        _ => return Err(error_from_status(&response.status, Vec::new())),
    }

    let issued = response
        .certified_key_pair
        .as_ref()
        .map(|pair| &pair.cert_or_enc_cert);
    let certificate = match issued {
        Some(CertOrEncCert::Certificate(cert)) => cert.clone(),
        Some(CertOrEncCert::EncryptedCert(_)) => {
            return Err(CmpError::decode("encrypted certificates are not supported"))
        }
        None => return Err(CmpError::decode("granted response carries no certificate")),
    };

    let ca_pubs = rep.ca_pubs.iter().flatten();
    let ca_certificates = dedup(ca_pubs.chain(message.extra_certs()))?;

    Ok(VerifiedResponse::Issued {
        certificate,
        ca_certificates,
        implicit_confirm_granted: message.header.has_implicit_confirm(),
    })
}

fn dedup<'a>(certs: impl Iterator<Item = &'a Certificate>) -> Result<Vec<Certificate>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for cert in certs {
        if seen.insert(cert.to_der()?) {
            unique.push(cert.clone());
        }
    }
    Ok(unique)
}

fn unexpected(body: &PkiBody, state: SessionState) -> CmpError {
    let sent = match state {
        SessionState::Polling => "pollReq",
        SessionState::Confirming => "certConf",
        _ => "certificate request",
    };
    CmpError::decode(format!("unexpected {} body in response to {}", body.name(), sent))
}

fn error_from_status(info: &PkiStatusInfo, extra: Vec<String>) -> CmpError {
    let mut texts = info.texts();
    texts.extend(extra);
    CmpError::pki_error(info.status, info.failure_info(), texts)
}

fn error_from_msg(content: &ErrorMsgContent) -> CmpError {
    let mut extra = content.error_details.clone().unwrap_or_default();
    if let Some(code) = content.error_code {
        extra.push(format!("error code {code}"));
    }
    error_from_status(&content.pki_status_info, extra)
}

/// Arrange the issued certificate and CA certificates into chain and trust
/// anchors.
///
/// Starting from the issued certificate, each step looks up the CA
/// certificate whose subject is the current certificate's issuer and checks
/// that it signed the current certificate. Intermediates join the chain. The
/// walk ends at the self-signed root, which stays with the trusted
/// certificates along with anything not placed in the chain.
///
/// # Errors
///
/// Returns [`CmpError::Protection`] when an issuer is missing from
/// `ca_certificates` or did not sign its subordinate.
pub fn build_certification_model(
    certificate: Certificate,
    ca_certificates: Vec<Certificate>,
) -> Result<Cmpv2CertificationModel> {
    let mut remaining = ca_certificates;
    let mut chain = vec![certificate];

    loop {
        let pos = find_issuer(&chain[chain.len() - 1], &remaining)?;
        if is_self_signed(&remaining[pos]) {
            break;
        }
        chain.push(remaining.remove(pos));
    }

    Ok(Cmpv2CertificationModel::new(chain, remaining))
}

/// Index of the candidate that is named as `cert`'s issuer and signed it.
fn find_issuer(cert: &Certificate, candidates: &[Certificate]) -> Result<usize> {
    let issuer = &cert.tbs_certificate.issuer;
    let mut named = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.tbs_certificate.subject == *issuer)
        .peekable();
    if named.peek().is_none() {
        return Err(CmpError::protection(format!(
            "Server response does not contain proper root CA certificate: {issuer} not found"
        )));
    }

    named
        .find(|(_, candidate)| {
            certificate_key(candidate)
                .and_then(|key| verify_certificate_signature(cert, &key))
                .is_ok()
        })
        .map(|(pos, _)| pos)
        .ok_or_else(|| {
            CmpError::protection(format!(
                "{} is not signed by {issuer}",
                cert.tbs_certificate.subject
            ))
        })
}

fn is_self_signed(cert: &Certificate) -> bool {
    cert.tbs_certificate.subject == cert.tbs_certificate.issuer
}
