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

//! Certificates and keys shared by the unit tests.
//!
//! Keys are fixed PEM fixtures so tests never pay for RSA key generation;
//! certificates are built once with rcgen.

use std::sync::OnceLock;

use der::Decode;
use rcgen::{BasicConstraints, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair};
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use x509_cert::Certificate;

use crate::directory::{CaServerDescriptor, ClientCredential};

pub(crate) const ROOT_KEY_PEM: &str = include_str!("../tests/fixtures/keys/root-ca-key.pem");
pub(crate) const ISSUING_KEY_PEM: &str = include_str!("../tests/fixtures/keys/issuing-ca-key.pem");
pub(crate) const WORKLOAD_KEY_PEM: &str = include_str!("../tests/fixtures/keys/workload-key.pem");
pub(crate) const RENEWAL_KEY_PEM: &str = include_str!("../tests/fixtures/keys/renewal-key.pem");

pub(crate) const ISSUING_CA_DN: &str = "CN=Test Issuing CA";

/// Two-level test PKI plus a client credential issued under it.
pub(crate) struct TestPki {
    pub root_cert: Certificate,
    pub issuing_cert: Certificate,
    pub issuing_key: RsaPrivateKey,
    pub client_cert: Certificate,
    pub client_key: RsaPrivateKey,
    issuing_rcgen: rcgen::Certificate,
    issuing_keypair: KeyPair,
}

pub(crate) fn pki() -> &'static TestPki {
    static PKI: OnceLock<TestPki> = OnceLock::new();
    PKI.get_or_init(build_pki)
}

fn named_params(cn: &str, sans: Vec<String>) -> CertificateParams {
    let mut params = CertificateParams::new(sans).unwrap();
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(DnType::CommonName, cn);
    params
}

fn ca_params(cn: &str) -> CertificateParams {
    let mut params = named_params(cn, Vec::new());
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
}

fn build_pki() -> TestPki {
    let root_keypair = KeyPair::from_pem(ROOT_KEY_PEM).unwrap();
    let root = ca_params("Test Root CA").self_signed(&root_keypair).unwrap();

    let issuing_keypair = KeyPair::from_pem(ISSUING_KEY_PEM).unwrap();
    let issuing = ca_params("Test Issuing CA")
        .signed_by(&issuing_keypair, &root, &root_keypair)
        .unwrap();

    let client_keypair = KeyPair::from_pem(RENEWAL_KEY_PEM).unwrap();
    let client = named_params("client.example", vec!["client.example".to_string()])
        .signed_by(&client_keypair, &issuing, &issuing_keypair)
        .unwrap();

    TestPki {
        root_cert: Certificate::from_der(root.der()).unwrap(),
        issuing_cert: Certificate::from_der(issuing.der()).unwrap(),
        issuing_key: RsaPrivateKey::from_pkcs8_pem(ISSUING_KEY_PEM).unwrap(),
        client_cert: Certificate::from_der(client.der()).unwrap(),
        client_key: RsaPrivateKey::from_pkcs8_pem(RENEWAL_KEY_PEM).unwrap(),
        issuing_rcgen: issuing,
        issuing_keypair,
    }
}

impl TestPki {
    /// Issue an end-entity certificate for `key_pem` under the issuing CA.
    pub(crate) fn issue(&self, cn: &str, key_pem: &str) -> Certificate {
        let keypair = KeyPair::from_pem(key_pem).unwrap();
        let cert = named_params(cn, vec![cn.to_string()])
            .signed_by(&keypair, &self.issuing_rcgen, &self.issuing_keypair)
            .unwrap();
        Certificate::from_der(cert.der()).unwrap()
    }

    pub(crate) fn client_credential(&self) -> ClientCredential {
        ClientCredential::new(self.client_cert.clone(), self.client_key.clone()).unwrap()
    }
}

pub(crate) fn workload_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(WORKLOAD_KEY_PEM).unwrap()
}

/// PEM CSR for the workload key.
pub(crate) fn workload_csr_pem(cn: &str) -> String {
    let keypair = KeyPair::from_pem(WORKLOAD_KEY_PEM).unwrap();
    named_params(cn, vec![cn.to_string()])
        .serialize_request(&keypair)
        .unwrap()
        .pem()
        .unwrap()
}

pub(crate) fn shared_secret_descriptor(url: &str) -> CaServerDescriptor {
    CaServerDescriptor::builder()
        .ca_name("Client")
        .url(url)
        .issuer_dn(ISSUING_CA_DN)
        .shared_secret("mypassword", "myreference")
        .build()
        .unwrap()
}

pub(crate) fn signature_descriptor(url: &str, pki: &TestPki) -> CaServerDescriptor {
    CaServerDescriptor::builder()
        .ca_name("Signed")
        .url(url)
        .issuer_dn(ISSUING_CA_DN)
        .signature(pki.client_credential())
        .ca_certificate(pki.issuing_cert.clone())
        .build()
        .unwrap()
}

/// Self-signed CA certificate named `cn` under `key_pem`, a key the test
/// PKI never uses for `cn`.
pub(crate) fn self_signed_ca(cn: &str, key_pem: &str) -> Certificate {
    let keypair = KeyPair::from_pem(key_pem).unwrap();
    let cert = ca_params(cn).self_signed(&keypair).unwrap();
    Certificate::from_der(cert.der()).unwrap()
}

/// Look-alike "Test Issuing CA" under a look-alike "Test Root CA", and a
/// leaf it issued for `cn`. Returns `(leaf, intermediate)`.
pub(crate) fn impostor_chain(cn: &str) -> (Certificate, Certificate) {
    let root_keypair = KeyPair::from_pem(WORKLOAD_KEY_PEM).unwrap();
    let root = ca_params("Test Root CA").self_signed(&root_keypair).unwrap();

    let intermediate_keypair = KeyPair::from_pem(RENEWAL_KEY_PEM).unwrap();
    let intermediate = ca_params("Test Issuing CA")
        .signed_by(&intermediate_keypair, &root, &root_keypair)
        .unwrap();

    let leaf_keypair = KeyPair::from_pem(WORKLOAD_KEY_PEM).unwrap();
    let leaf = named_params(cn, vec![cn.to_string()])
        .signed_by(&leaf_keypair, &intermediate, &intermediate_keypair)
        .unwrap();

    (
        Certificate::from_der(leaf.der()).unwrap(),
        Certificate::from_der(intermediate.der()).unwrap(),
    )
}
