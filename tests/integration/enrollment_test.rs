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

//! Integration tests for ir, cr and kur enrollments

use std::str::FromStr;

use tokio_util::sync::CancellationToken;
use usg_cmp_client::types::{oid, PkiBody};
use usg_cmp_client::CaServerDescriptor;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::name::Name;

use crate::integration::{
    client, client_for, fast_polling, pki, shared_secret_descriptor, workload_request,
    CaProtection, MockCmpServer, Step, IAK, ISSUING_CA_DN, RV,
};

#[tokio::test]
async fn test_initialization_request_with_implicit_confirm() {
    let mock = MockCmpServer::start(vec![Step::Issue]).await;
    let client = client(&mock);

    let model = client
        .initialization_request(
            "Client",
            &workload_request("workload.example"),
            &CancellationToken::new(),
        )
        .await
        .expect("Enrollment failed");

    // Leaf first, then the issuing CA; the self-signed root is a trust anchor
    let pki = pki();
    assert_eq!(
        model.certificate().tbs_certificate.subject,
        Name::from_str("CN=workload.example").unwrap()
    );
    assert_eq!(model.certificate_chain().len(), 2);
    assert_eq!(model.certificate_chain()[1], pki.issuing_cert);
    assert_eq!(model.trusted_certificates(), &[pki.root_cert.clone()]);

    let received = mock.received();
    assert_eq!(received.len(), 1, "implicit confirm needs no certConf");
    let ir = &received[0];
    assert!(matches!(ir.body, PkiBody::InitRequest(_)));
    assert!(ir.header.has_implicit_confirm());
    assert_eq!(ir.header.sender_kid.as_ref().unwrap().as_bytes(), RV.as_bytes());
    assert_eq!(
        ir.header.protection_alg.as_ref().unwrap().oid,
        oid::PASSWORD_BASED_MAC
    );
    assert_eq!(
        ir.header.recipient,
        GeneralName::DirectoryName(Name::from_str(ISSUING_CA_DN).unwrap())
    );
    assert_eq!(ir.header.transaction_id.as_ref().unwrap().as_bytes().len(), 16);
    assert_eq!(ir.header.sender_nonce.as_ref().unwrap().as_bytes().len(), 16);
    assert!(ir.header.recip_nonce.is_none());
}

#[tokio::test]
async fn test_request_template_and_pop() {
    let mock = MockCmpServer::start(vec![Step::Issue]).await;
    let client = client(&mock);

    client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await
        .expect("Enrollment failed");

    let received = mock.received();
    let msgs = received[0].body.cert_req_messages().unwrap();
    assert_eq!(msgs.len(), 1);
    let template = &msgs[0].cert_req.cert_template;
    assert_eq!(template.issuer, Some(Name::from_str(ISSUING_CA_DN).unwrap()));
    assert_eq!(
        template.subject,
        Some(Name::from_str("CN=workload.example").unwrap())
    );
    assert!(template.public_key.is_some());
    assert!(msgs[0].popo.is_some(), "proof of possession must be present");
}

#[tokio::test]
async fn test_explicit_confirmation_round_trip() {
    let mock = MockCmpServer::start(vec![Step::Issue, Step::Confirm]).await;
    let descriptor = CaServerDescriptor::builder()
        .ca_name("Client")
        .url(mock.url())
        .issuer_dn(ISSUING_CA_DN)
        .shared_secret(IAK, RV)
        .implicit_confirm(false)
        .build()
        .unwrap();
    let client = client_for(vec![descriptor], fast_polling());

    client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await
        .expect("Enrollment failed");

    let received = mock.received();
    assert_eq!(received.len(), 2);
    assert!(!received[0].header.has_implicit_confirm());
    let PkiBody::CertConfirm(statuses) = &received[1].body else {
        panic!("expected certConf, got {}", received[1].body.name());
    };
    assert_eq!(statuses.len(), 1);
    assert!(statuses[0].status_info.is_none());
    assert_eq!(
        received[1].header.transaction_id,
        received[0].header.transaction_id
    );
    assert_eq!(received[1].header.sender_nonce, received[0].header.sender_nonce);
    assert!(received[1].header.recip_nonce.is_some());
}

#[tokio::test]
async fn test_implicit_confirm_not_granted() {
    // Declared on our side, ignored by the CA: no certConf is sent anyway
    let mock =
        MockCmpServer::start_with(CaProtection::SharedSecret(IAK), false, vec![Step::Issue]).await;
    let client = client(&mock);

    let result = client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await;

    assert!(result.is_ok(), "enroll failed: {:?}", result.err());
    assert_eq!(mock.received().len(), 1);
}

#[tokio::test]
async fn test_certification_request() {
    let mock = MockCmpServer::start(vec![Step::Issue]).await;
    let client = client(&mock);

    let model = client
        .certification_request(
            "Client",
            &workload_request("cr.example"),
            &CancellationToken::new(),
        )
        .await
        .expect("Enrollment failed");

    assert_eq!(
        model.certificate().tbs_certificate.subject,
        Name::from_str("CN=cr.example").unwrap()
    );
    assert!(matches!(mock.received()[0].body, PkiBody::CertRequest(_)));
}

#[tokio::test]
async fn test_signature_protected_enrollment_with_pinned_ca() {
    let pki = pki();
    let mock =
        MockCmpServer::start_with(CaProtection::Signature, true, vec![Step::Issue]).await;
    let descriptor = CaServerDescriptor::builder()
        .ca_name("Signed")
        .url(mock.url())
        .issuer_dn(ISSUING_CA_DN)
        .signature(pki.client_credential())
        .ca_certificate(pki.issuing_cert.clone())
        .build()
        .unwrap();
    let client = client_for(vec![descriptor], fast_polling());

    client
        .enroll("Signed", &workload_request("workload.example"), &CancellationToken::new())
        .await
        .expect("Enrollment failed");

    let ir = &mock.received()[0];
    let credential = pki.client_credential();
    assert_eq!(
        ir.header.protection_alg.as_ref().unwrap().oid,
        oid::SHA_256_WITH_RSA_ENCRYPTION
    );
    assert!(ir.header.sender_kid.is_none());
    assert_eq!(ir.extra_certs(), &[credential.certificate.clone()]);
    assert_eq!(
        ir.header.sender,
        GeneralName::DirectoryName(credential.certificate.tbs_certificate.subject.clone())
    );
}

#[tokio::test]
async fn test_signature_protection_trusts_ca_issued_by_pinned_root() {
    let pki = pki();
    let mock =
        MockCmpServer::start_with(CaProtection::Signature, true, vec![Step::Issue]).await;
    // Only the root is pinned; the issuing CA's certificate arrives in extraCerts
    let descriptor = CaServerDescriptor::builder()
        .ca_name("Signed")
        .url(mock.url())
        .issuer_dn(ISSUING_CA_DN)
        .signature(pki.client_credential())
        .ca_certificate(pki.root_cert.clone())
        .build()
        .unwrap();
    let client = client_for(vec![descriptor], fast_polling());

    let result = client
        .enroll("Signed", &workload_request("workload.example"), &CancellationToken::new())
        .await;

    assert!(result.is_ok(), "enroll failed: {:?}", result.err());
}

#[tokio::test]
async fn test_key_update_request() {
    let pki = pki();
    let mock =
        MockCmpServer::start_with(CaProtection::Signature, true, vec![Step::Issue]).await;
    let client = client(&mock);

    let model = client
        .key_update_request(
            "Client",
            &workload_request("client.example"),
            pki.client_credential(),
            &CancellationToken::new(),
        )
        .await
        .expect("Key update failed");

    assert_eq!(model.certificate_chain().len(), 2);
    let kur = &mock.received()[0];
    assert!(matches!(kur.body, PkiBody::KeyUpdateRequest(_)));
    assert_eq!(kur.extra_certs(), &[pki.client_credential().certificate]);
}

#[tokio::test]
async fn test_sequential_enrollments_use_fresh_identifiers() {
    let mock = MockCmpServer::start(vec![Step::Issue, Step::Issue]).await;
    let client = client(&mock);
    let request = workload_request("workload.example");

    for _ in 0..2 {
        client
            .enroll("Client", &request, &CancellationToken::new())
            .await
            .expect("Enrollment failed");
    }

    let received = mock.received();
    assert_eq!(received.len(), 2);
    assert_ne!(received[0].header.transaction_id, received[1].header.transaction_id);
    assert_ne!(received[0].header.sender_nonce, received[1].header.sender_nonce);
}

#[tokio::test]
async fn test_concurrent_enrollments_to_two_cas() {
    let first = MockCmpServer::start(vec![Step::Issue]).await;
    let second = MockCmpServer::start(vec![Step::Issue, Step::Confirm]).await;

    let mut explicit = shared_secret_descriptor(&second.url(), "Second");
    explicit.implicit_confirm = false;
    let client = client_for(
        vec![shared_secret_descriptor(&first.url(), "First"), explicit],
        fast_polling(),
    );

    let request = workload_request("workload.example");
    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(
        client.enroll("First", &request, &cancel),
        client.enroll("Second", &request, &cancel),
    );

    assert!(a.is_ok(), "First failed: {:?}", a.err());
    assert!(b.is_ok(), "Second failed: {:?}", b.err());
    assert_eq!(first.received().len(), 1);
    assert_eq!(second.received().len(), 2);
}
