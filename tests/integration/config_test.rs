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

//! Integration tests for loading CA descriptors from files

use std::fs;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use usg_cmp_client::{
    Authentication, CaMode, CmpClient, CmpClientConfig, ErrorKind, ServerDirectory,
};

use crate::integration::{
    fast_polling, pki, workload_request, CaProtection, MockCmpServer, Step, IAK, ISSUING_CA_DN,
    RV,
};

const RENEWAL_KEY_PEM: &str = include_str!("../fixtures/keys/renewal-key.pem");

fn client(directory: ServerDirectory) -> CmpClient {
    let config = CmpClientConfig::builder()
        .trust_any_insecure()
        .timeout(Duration::from_secs(5))
        .polling(fast_polling())
        .build()
        .expect("Valid config");
    CmpClient::new(directory, config).expect("Client creation failed")
}

#[tokio::test]
async fn test_enroll_with_json_directory() {
    let mock = MockCmpServer::start(vec![Step::Issue]).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmpServers.json");
    let json = serde_json::json!({
        "cmpv2Servers": [{
            "caName": "RA",
            "url": mock.url(),
            "issuerDN": ISSUING_CA_DN,
            "caMode": "RA",
            "authentication": { "iak": IAK, "rv": RV }
        }]
    });
    fs::write(&path, json.to_string()).unwrap();

    let directory = ServerDirectory::from_file(&path).expect("Config should load");
    let descriptor = directory.resolve("RA").unwrap();
    assert_eq!(descriptor.ca_mode, CaMode::Ra);
    assert!(descriptor.implicit_confirm);
    assert!(matches!(descriptor.authentication, Authentication::SharedSecret { .. }));

    let result = client(directory)
        .enroll("RA", &workload_request("workload.example"), &CancellationToken::new())
        .await;
    assert!(result.is_ok(), "enroll failed: {:?}", result.err());
}

#[tokio::test]
async fn test_enroll_with_toml_signature_directory() {
    let pki = pki();
    let mock = MockCmpServer::start_with(CaProtection::Signature, true, vec![Step::Issue]).await;

    // Credential paths are relative to the config file
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("client.pem"), &pki.client_cert_pem).unwrap();
    fs::write(dir.path().join("client.key"), RENEWAL_KEY_PEM).unwrap();
    fs::write(dir.path().join("ca.pem"), &pki.issuing_cert_pem).unwrap();
    let path = dir.path().join("servers.toml");
    fs::write(
        &path,
        format!(
            r#"
[[cmpv2Servers]]
caName = "Signed"
url = "{url}"
issuerDN = "{issuer}"
caCertificate = "ca.pem"
implicitConfirm = true

[cmpv2Servers.authentication]
certificate = "client.pem"
privateKey = "client.key"
"#,
            url = mock.url(),
            issuer = ISSUING_CA_DN,
        ),
    )
    .unwrap();

    let directory = ServerDirectory::from_file(&path).expect("Config should load");
    let descriptor = directory.resolve("Signed").unwrap();
    assert_eq!(descriptor.ca_mode, CaMode::Client);
    assert_eq!(descriptor.ca_certificate.as_ref(), Some(&pki.issuing_cert));

    let result = client(directory)
        .enroll("Signed", &workload_request("workload.example"), &CancellationToken::new())
        .await;
    assert!(result.is_ok(), "enroll failed: {:?}", result.err());
}

#[tokio::test]
async fn test_invalid_directory_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cmpServers.json");
    fs::write(
        &path,
        r#"{"cmpv2Servers":[{"caName":"","url":"http://ca.example/","issuerDN":"CN=CA",
            "authentication":{"iak":"a","rv":"b"}}]}"#,
    )
    .unwrap();

    let err = ServerDirectory::from_file(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = ServerDirectory::from_file(dir.path().join("missing.json")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
