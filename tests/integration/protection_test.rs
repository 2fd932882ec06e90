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

//! Integration tests for response protection and session binding

use tokio_util::sync::CancellationToken;
use usg_cmp_client::{CaServerDescriptor, CmpClient, CmpError, ErrorKind};

use crate::integration::{
    client, client_for, fast_polling, pki, workload_request, CaProtection, MockCmpServer, Step,
    ISSUING_CA_DN,
};

async fn enroll(client: &CmpClient, name: &str) -> CmpError {
    client
        .enroll(name, &workload_request("workload.example"), &CancellationToken::new())
        .await
        .expect_err("enrollment should have failed")
}

#[tokio::test]
async fn test_tampered_protection_is_rejected() {
    let mock = MockCmpServer::start(vec![Step::TamperedIssue]).await;
    let client = client(&mock);

    // The body inside is an accepted ip; it must not matter
    let err = enroll(&client, "Client").await;
    assert_eq!(err.kind(), ErrorKind::Protection, "got {err:?}");
}

#[tokio::test]
async fn test_wrong_recip_nonce_is_nonce_mismatch() {
    let mock = MockCmpServer::start(vec![Step::WrongNonce]).await;
    let client = client(&mock);

    // Protection is valid; the nonce check still wins
    let err = enroll(&client, "Client").await;
    assert_eq!(err.kind(), ErrorKind::NonceMismatch, "got {err:?}");
}

#[tokio::test]
async fn test_wrong_transaction_id_is_nonce_mismatch() {
    let mock = MockCmpServer::start(vec![Step::WrongTransaction]).await;
    let client = client(&mock);

    let err = enroll(&client, "Client").await;
    assert_eq!(err.kind(), ErrorKind::NonceMismatch, "got {err:?}");
}

#[tokio::test]
async fn test_ca_with_different_secret() {
    let mock = MockCmpServer::start_with(
        CaProtection::SharedSecret("not-the-password"),
        true,
        vec![Step::Issue],
    )
    .await;
    let client = client(&mock);

    let err = enroll(&client, "Client").await;
    assert_eq!(err.kind(), ErrorKind::Protection, "got {err:?}");
}

#[tokio::test]
async fn test_unprotected_response_is_rejected() {
    let mock = MockCmpServer::start(vec![Step::UnprotectedIssue]).await;
    let client = client(&mock);

    let err = enroll(&client, "Client").await;
    assert!(matches!(err, CmpError::Protection(_)), "got {err:?}");
}

#[tokio::test]
async fn test_signature_answer_to_shared_secret_request() {
    let mock = MockCmpServer::start_with(CaProtection::Signature, true, vec![Step::Issue]).await;
    let client = client(&mock);

    let err = enroll(&client, "Client").await;
    assert_eq!(err.kind(), ErrorKind::Protection, "got {err:?}");
}

#[tokio::test]
async fn test_pinned_certificate_that_did_not_sign() {
    let pki = pki();
    let mock = MockCmpServer::start_with(CaProtection::Signature, true, vec![Step::Issue]).await;

    // Pin a certificate unrelated to the CA's signing key
    let descriptor = CaServerDescriptor::builder()
        .ca_name("Signed")
        .url(mock.url())
        .issuer_dn(ISSUING_CA_DN)
        .signature(pki.client_credential())
        .ca_certificate(pki.client_credential().certificate)
        .build()
        .unwrap();
    let client = client_for(vec![descriptor], fast_polling());

    let err = enroll(&client, "Signed").await;
    assert_eq!(err.kind(), ErrorKind::Protection, "got {err:?}");
}

#[tokio::test]
async fn test_look_alike_ca_signature_is_rejected() {
    let pki = pki();
    let mock =
        MockCmpServer::start_with(CaProtection::LookAlikeSignature, true, vec![Step::Issue]).await;
    let descriptor = CaServerDescriptor::builder()
        .ca_name("Signed")
        .url(mock.url())
        .issuer_dn(ISSUING_CA_DN)
        .signature(pki.client_credential())
        .ca_certificate(pki.issuing_cert.clone())
        .build()
        .unwrap();
    let client = client_for(vec![descriptor], fast_polling());

    // The look-alike names itself "Test Issuing CA" in extraCerts
    let err = enroll(&client, "Signed").await;
    assert_eq!(err.kind(), ErrorKind::Protection, "got {err:?}");
}

#[test]
fn test_signature_descriptor_requires_ca_certificate() {
    let err = CaServerDescriptor::builder()
        .ca_name("Signed")
        .url("http://ca.example/pkix/")
        .issuer_dn(ISSUING_CA_DN)
        .signature(pki().client_credential())
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
