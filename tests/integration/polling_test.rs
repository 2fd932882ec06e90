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

//! Integration tests for delayed delivery (pollReq / pollRep)

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use usg_cmp_client::types::PkiBody;
use usg_cmp_client::{CmpError, ErrorKind};

use crate::integration::{
    client, client_for, fast_polling, shared_secret_descriptor, workload_request, MockCmpServer,
    Step,
};

#[tokio::test]
async fn test_waiting_then_accepted() {
    // Three "not ready" answers, then the certificate
    let mock = MockCmpServer::start(vec![
        Step::Waiting,
        Step::NotReady,
        Step::NotReady,
        Step::Issue,
    ])
    .await;
    let client = client(&mock);

    let result = client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await;
    assert!(result.is_ok(), "enroll failed: {:?}", result.err());

    let received = mock.received();
    assert_eq!(received.len(), 4);
    assert!(matches!(received[0].body, PkiBody::InitRequest(_)));
    for poll in &received[1..] {
        let PkiBody::PollRequest(entries) = &poll.body else {
            panic!("expected pollReq, got {}", poll.body.name());
        };
        let ir_id = received[0].body.cert_req_messages().unwrap()[0].cert_req.cert_req_id;
        assert_eq!(entries[0].cert_req_id, ir_id);
        assert_eq!(poll.header.transaction_id, received[0].header.transaction_id);
        assert_eq!(poll.header.sender_nonce, received[0].header.sender_nonce);
        assert!(!poll.header.has_implicit_confirm());
    }
}

#[tokio::test]
async fn test_poll_budget_exceeded() {
    let mock = MockCmpServer::start(vec![
        Step::Waiting,
        Step::NotReady,
        Step::NotReady,
        Step::Issue,
    ])
    .await;
    let client = client_for(
        vec![shared_secret_descriptor(&mock.url(), "Client")],
        fast_polling().max_polls(2),
    );

    let err = client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CmpError::PollTimeout { polls: 2 }), "got {err:?}");
    assert!(err.is_retryable());
    // The ir and exactly two polls; nothing after the budget ran out
    assert_eq!(mock.received().len(), 3);
}

#[tokio::test]
async fn test_cancellation_during_poll_wait() {
    let mock = MockCmpServer::start(vec![Step::Waiting]).await;
    let client = client_for(
        vec![shared_secret_descriptor(&mock.url(), "Client")],
        fast_polling().interval(Duration::from_secs(30)),
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .enroll("Client", &workload_request("workload.example"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(mock.received().len(), 1);
}

#[tokio::test]
async fn test_waiting_then_explicit_confirm() {
    let mock = MockCmpServer::start(vec![Step::Waiting, Step::Issue, Step::Confirm]).await;
    let mut descriptor = shared_secret_descriptor(&mock.url(), "Client");
    descriptor.implicit_confirm = false;
    let client = client_for(vec![descriptor], fast_polling());

    let result = client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await;
    assert!(result.is_ok(), "enroll failed: {:?}", result.err());

    let received = mock.received();
    let bodies: Vec<&str> = received.iter().map(|m| m.body.name()).collect();
    assert_eq!(bodies, ["ir", "pollReq", "certConf"]);
}

#[tokio::test]
async fn test_rejection_while_polling_is_terminal() {
    let mock = MockCmpServer::start(vec![
        Step::Waiting,
        Step::Reject {
            fail_info: 1 << 2,
            text: "Request denied by officer",
        },
    ])
    .await;
    let client = client(&mock);

    let err = client
        .enroll("Client", &workload_request("workload.example"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PkiError);
    assert!(!err.is_retryable());
    assert_eq!(mock.received().len(), 2);
}
