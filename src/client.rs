//! CMP client implementation.
//!
//! This module provides [`CmpClient`], which drives one enrollment per call
//! through the CMP exchange: request, optional delayed delivery, and
//! confirmation.

use std::fmt;

use der::asn1::OctetString;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use spki::ObjectIdentifier;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use x509_cert::Certificate;

use crate::config::{CmpClientConfig, PollingConfig};
use crate::directory::{CaServerDescriptor, ClientCredential, ServerDirectory};
use crate::error::{CmpError, Result};
use crate::protection::{self, ProtectionContext, SignatureProtection};
use crate::request::EnrollmentRequest;
use crate::session::{EnrollmentSession, SessionState};
use crate::transport::{HttpTransport, Transport};
use crate::types::body::tags;
use crate::types::{self, oid, CertStatus, Cmpv2CertificationModel, PkiBody, PollReqEntry};
use crate::verify::{build_certification_model, verify_response, VerifiedResponse};

/// Which certificate request an enrollment sends.
#[derive(Clone, Copy)]
enum RequestKind {
    Initialization,
    Certification,
    KeyUpdate,
}

impl RequestKind {
    fn body(self, messages: types::CertReqMessages) -> PkiBody {
        match self {
            Self::Initialization => PkiBody::InitRequest(messages),
            Self::Certification => PkiBody::CertRequest(messages),
            Self::KeyUpdate => PkiBody::KeyUpdateRequest(messages),
        }
    }

    fn response_tag(self) -> u8 {
        match self {
            Self::Initialization => tags::IP,
            Self::Certification => tags::CP,
            Self::KeyUpdate => tags::KUP,
        }
    }
}

/// CMP client for certificate enrollment.
///
/// The client holds the loaded CA directory and a transport. It keeps no
/// per-enrollment state: every call creates its own session with fresh
/// identifiers, so one client can serve concurrent enrollments.
///
/// # Example
///
/// ```no_run
/// use tokio_util::sync::CancellationToken;
/// use usg_cmp_client::{CmpClient, CmpClientConfig, EnrollmentRequest, ServerDirectory};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let directory = ServerDirectory::from_file("cmpServers.json")?;
/// let config = CmpClientConfig::builder().build()?;
/// let client = CmpClient::new(directory, config)?;
///
/// let request = EnrollmentRequest::from_pem(
///     &std::fs::read("workload.csr")?,
///     &std::fs::read("workload.key")?,
/// )?;
/// let model = client
///     .enroll("RA", &request, &CancellationToken::new())
///     .await?;
/// println!("{}", model.certificate_chain_pem()?);
/// # Ok(())
/// # }
/// ```
pub struct CmpClient<T: Transport = HttpTransport> {
    directory: ServerDirectory,
    transport: T,
    polling: PollingConfig,
}

impl CmpClient<HttpTransport> {
    /// Create a new CMP client speaking CMP over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS configuration fails.
    pub fn new(directory: ServerDirectory, config: CmpClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(directory, transport, config.polling))
    }
}

impl<T: Transport> CmpClient<T> {
    /// Create a client over a caller-supplied transport.
    pub fn with_transport(
        directory: ServerDirectory,
        transport: T,
        polling: PollingConfig,
    ) -> Self {
        Self {
            directory,
            transport,
            polling,
        }
    }

    /// The CA directory this client resolves names against.
    pub fn directory(&self) -> &ServerDirectory {
        &self.directory
    }

    /// Enroll for a first certificate from `ca_name`.
    ///
    /// Same as [`initialization_request`](Self::initialization_request).
    pub async fn enroll(
        &self,
        ca_name: &str,
        request: &EnrollmentRequest,
        cancel: &CancellationToken,
    ) -> Result<Cmpv2CertificationModel> {
        self.initialization_request(ca_name, request, cancel).await
    }

    /// Send an initialization request (ir) and return the issued chain.
    ///
    /// # Errors
    ///
    /// Returns [`CmpError::ServerNotFound`] without contacting any CA when
    /// `ca_name` is not registered. Any other failure ends the session; a
    /// retry must call again and gets fresh identifiers.
    pub async fn initialization_request(
        &self,
        ca_name: &str,
        request: &EnrollmentRequest,
        cancel: &CancellationToken,
    ) -> Result<Cmpv2CertificationModel> {
        let descriptor = self.directory.resolve(ca_name)?;
        let protection = protection::for_descriptor(descriptor)?;
        self.run(descriptor, protection, request, RequestKind::Initialization, cancel)
            .await
    }

    /// Send a certification request (cr) and return the issued chain.
    pub async fn certification_request(
        &self,
        ca_name: &str,
        request: &EnrollmentRequest,
        cancel: &CancellationToken,
    ) -> Result<Cmpv2CertificationModel> {
        let descriptor = self.directory.resolve(ca_name)?;
        let protection = protection::for_descriptor(descriptor)?;
        self.run(descriptor, protection, request, RequestKind::Certification, cancel)
            .await
    }

    /// Send a key update request (kur) renewing `current`.
    ///
    /// The request is signed with `current`'s key and carries its
    /// certificate, whatever authentication the CA descriptor declares. The
    /// descriptor must pin a CA certificate to verify the signed answer.
    pub async fn key_update_request(
        &self,
        ca_name: &str,
        request: &EnrollmentRequest,
        current: ClientCredential,
        cancel: &CancellationToken,
    ) -> Result<Cmpv2CertificationModel> {
        let descriptor = self.directory.resolve(ca_name)?;
        let protection = Box::new(SignatureProtection::new(current, descriptor)?);
        self.run(descriptor, protection, request, RequestKind::KeyUpdate, cancel)
            .await
    }

    async fn run(
        &self,
        descriptor: &CaServerDescriptor,
        protection: Box<dyn ProtectionContext>,
        request: &EnrollmentRequest,
        kind: RequestKind,
        cancel: &CancellationToken,
    ) -> Result<Cmpv2CertificationModel> {
        let sender = protection
            .sender()
            .unwrap_or_else(|| request.subject().clone());
        let mut session = EnrollmentSession::new(
            protection,
            sender,
            descriptor.issuer_dn.clone(),
            descriptor.implicit_confirm,
        );
        tracing::debug!(
            "Starting CMP enrollment with {} ({} mode)",
            descriptor.ca_name,
            descriptor.ca_mode
        );

        match self
            .drive(descriptor, &mut session, request, kind, cancel)
            .await
        {
            Ok(model) => {
                session.transition(SessionState::Done);
                tracing::info!(
                    "Enrolled certificate from {} after {} poll(s)",
                    descriptor.ca_name,
                    session.polls()
                );
                Ok(model)
            }
            Err(e) => {
                session.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        descriptor: &CaServerDescriptor,
        session: &mut EnrollmentSession,
        request: &EnrollmentRequest,
        kind: RequestKind,
        cancel: &CancellationToken,
    ) -> Result<Cmpv2CertificationModel> {
        if cancel.is_cancelled() {
            return Err(CmpError::Cancelled);
        }

        let cert_req = request.cert_req_msg(session.cert_req_id(), &descriptor.issuer_dn)?;
        let expected = kind.response_tag();
        let body = kind.body(vec![cert_req]);
        let mut response = self
            .round_trip(descriptor, session, body, SessionState::Sent, expected)
            .await?;

        let started = Instant::now();
        let (certificate, ca_certificates, granted) = loop {
            match response {
                VerifiedResponse::Issued {
                    certificate,
                    ca_certificates,
                    implicit_confirm_granted,
                } => break (certificate, ca_certificates, implicit_confirm_granted),
                VerifiedResponse::Waiting { check_after } => {
                    session.transition(SessionState::AwaitingPollDecision);
                    self.wait_before_poll(session, check_after, started, cancel)
                        .await?;
                    let poll = PkiBody::PollRequest(vec![PollReqEntry {
                        cert_req_id: session.cert_req_id(),
                    }]);
                    response = self
                        .round_trip(descriptor, session, poll, SessionState::Polling, expected)
                        .await?;
                }
                VerifiedResponse::Confirmed => {
                    return Err(CmpError::decode(
                        "unexpected pkiconf body in response to certificate request",
                    ))
                }
            }
        };

        if certificate.tbs_certificate.issuer != descriptor.issuer_dn {
            tracing::warn!(
                "Issued certificate names issuer {}, expected {}",
                certificate.tbs_certificate.issuer,
                descriptor.issuer_dn
            );
        }

        let model = build_certification_model(*certificate, ca_certificates)?;

        if session.implicit_confirm() {
            if !granted {
                tracing::warn!(
                    "{} did not grant implicit confirmation; not sending certConf",
                    descriptor.ca_name
                );
            }
        } else {
            self.confirm(descriptor, session, model.certificate(), expected)
                .await?;
        }

        Ok(model)
    }

    /// Sleep until the next poll is due, or fail if the budget is spent.
    async fn wait_before_poll(
        &self,
        session: &EnrollmentSession,
        check_after: Option<i64>,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let polls = session.polls();
        if polls >= self.polling.max_polls {
            return Err(CmpError::PollTimeout { polls });
        }

        let wait = self.polling.wait_for(check_after.unwrap_or(0));
        if let Some(deadline) = self.polling.deadline {
            if started.elapsed() + wait > deadline {
                return Err(CmpError::PollTimeout { polls });
            }
        }

        tracing::debug!("Certificate not ready, polling again in {:?}", wait);
        tokio::select! {
            _ = cancel.cancelled() => Err(CmpError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }

    async fn confirm(
        &self,
        descriptor: &CaServerDescriptor,
        session: &mut EnrollmentSession,
        certificate: &Certificate,
        expected: u8,
    ) -> Result<()> {
        let cert_hash = certificate_hash(certificate)?;
        let body = PkiBody::CertConfirm(vec![CertStatus {
            cert_hash: OctetString::new(cert_hash)?,
            cert_req_id: session.cert_req_id(),
            status_info: None,
        }]);

        match self
            .round_trip(descriptor, session, body, SessionState::Confirming, expected)
            .await?
        {
            VerifiedResponse::Confirmed => Ok(()),
            _ => Err(CmpError::decode("certConf was not acknowledged with pkiconf")),
        }
    }

    /// Send `body` in state `state` and verify the CA's answer.
    async fn round_trip(
        &self,
        descriptor: &CaServerDescriptor,
        session: &mut EnrollmentSession,
        body: PkiBody,
        state: SessionState,
        expected: u8,
    ) -> Result<VerifiedResponse> {
        let message = session.message(body)?;
        let request = types::encode(&message)?;

        session.transition(state);
        let raw = self.transport.exchange(&descriptor.url, &request).await?;
        let response = types::decode(&raw)?;

        let verified = verify_response(session, &response, &raw, expected)?;
        session.record_response(&response.header);
        Ok(verified)
    }
}

impl<T: Transport> fmt::Debug for CmpClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmpClient")
            .field("directory", &self.directory)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

/// `certHash` for certConf: the certificate digested with the hash of its
/// own signature algorithm.
fn certificate_hash(certificate: &Certificate) -> Result<Vec<u8>> {
    let der = der::Encode::to_der(certificate)?;
    Ok(match confirm_digest(certificate.signature_algorithm.oid) {
        ConfirmDigest::Sha1 => Sha1::digest(&der).to_vec(),
        ConfirmDigest::Sha256 => Sha256::digest(&der).to_vec(),
        ConfirmDigest::Sha384 => Sha384::digest(&der).to_vec(),
        ConfirmDigest::Sha512 => Sha512::digest(&der).to_vec(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfirmDigest {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

fn confirm_digest(alg: ObjectIdentifier) -> ConfirmDigest {
    if alg == oid::SHA_1_WITH_RSA_ENCRYPTION || alg == oid::ECDSA_WITH_SHA1 {
        ConfirmDigest::Sha1
    } else if alg == oid::SHA_384_WITH_RSA_ENCRYPTION || alg == oid::ECDSA_WITH_SHA384 {
        ConfirmDigest::Sha384
    } else if alg == oid::SHA_512_WITH_RSA_ENCRYPTION || alg == oid::ECDSA_WITH_SHA512 {
        ConfirmDigest::Sha512
    } else {
        ConfirmDigest::Sha256
    }
}
