//! Error types for the CMP client.
//!
//! Every failure that leaves the crate is one [`CmpError`]. Library errors
//! raised while decoding or talking to the CA are folded into the matching
//! kind before they are returned, so callers never see a raw `der` or
//! `reqwest` error.

use std::fmt;

use thiserror::Error;

use crate::types::{PkiFailureInfo, PkiStatus};

/// Result type alias using [`CmpError`].
pub type Result<T> = std::result::Result<T, CmpError>;

/// Errors that can occur during a CMP enrollment.
#[derive(Debug, Error)]
pub enum CmpError {
    /// No CA descriptor is registered under the requested name.
    #[error("No server found for given CA name: {name}")]
    ServerNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// A wire message was truncated, malformed or not valid for the exchange.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Message protection was missing, unsupported or did not verify.
    #[error("Protection error: {0}")]
    Protection(String),

    /// The response does not belong to this session.
    #[error("Nonce mismatch: {0}")]
    NonceMismatch(String),

    /// The CA reported a rejection or an error message.
    #[error("{}", format_pki_error(*status, fail_info, texts))]
    PkiError {
        /// Status reported by the CA.
        status: PkiStatus,
        /// Raw PKIFailureInfo bits, if the CA sent any.
        fail_info: Option<PkiFailureInfo>,
        /// Free text supplied by the CA.
        texts: Vec<String>,
    },

    /// Delayed delivery did not resolve within the polling budget.
    #[error("Polling timed out after {polls} poll request(s)")]
    PollTimeout {
        /// Number of poll requests that were sent.
        polls: u32,
    },

    /// The enrollment was cancelled by the caller.
    #[error("Enrollment cancelled")]
    Cancelled,

    /// Network or endpoint failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The caller supplied an unusable CSR or key.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// CA descriptors or client configuration are invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stable classification of [`CmpError`], one per exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`CmpError::ServerNotFound`].
    ServerNotFound,
    /// See [`CmpError::Decode`].
    Decode,
    /// See [`CmpError::Protection`].
    Protection,
    /// See [`CmpError::NonceMismatch`].
    NonceMismatch,
    /// See [`CmpError::PkiError`].
    PkiError,
    /// See [`CmpError::PollTimeout`].
    PollTimeout,
    /// See [`CmpError::Cancelled`].
    Cancelled,
    /// See [`CmpError::Transport`].
    Transport,
    /// See [`CmpError::InvalidRequest`].
    InvalidRequest,
    /// See [`CmpError::Configuration`].
    Configuration,
}

impl ErrorKind {
    /// Process exit code for this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::ServerNotFound => 2,
            Self::Decode => 3,
            Self::Protection => 4,
            Self::NonceMismatch => 5,
            Self::PkiError => 6,
            Self::PollTimeout => 7,
            Self::Cancelled => 8,
            Self::Transport => 9,
            Self::InvalidRequest => 10,
            Self::Configuration => 11,
        }
    }
}

impl CmpError {
    /// Create a server-not-found error.
    pub fn server_not_found(name: impl Into<String>) -> Self {
        Self::ServerNotFound { name: name.into() }
    }

    /// Create a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a protection error with the given message.
    pub fn protection(msg: impl Into<String>) -> Self {
        Self::Protection(msg.into())
    }

    /// Create a nonce mismatch error with the given message.
    pub fn nonce_mismatch(msg: impl Into<String>) -> Self {
        Self::NonceMismatch(msg.into())
    }

    /// Create a PKI error from the CA's status information.
    pub fn pki_error(
        status: PkiStatus,
        fail_info: Option<PkiFailureInfo>,
        texts: Vec<String>,
    ) -> Self {
        Self::PkiError {
            status,
            fail_info,
            texts,
        }
    }

    /// Create a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a configuration error with the given message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ServerNotFound { .. } => ErrorKind::ServerNotFound,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Protection(_) => ErrorKind::Protection,
            Self::NonceMismatch(_) => ErrorKind::NonceMismatch,
            Self::PkiError { .. } => ErrorKind::PkiError,
            Self::PollTimeout { .. } => ErrorKind::PollTimeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Transport(_) => ErrorKind::Transport,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Returns true if a fresh session may succeed where this one failed.
    ///
    /// Nothing is retried inside the crate; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::PollTimeout { .. })
    }
}

impl From<der::Error> for CmpError {
    fn from(err: der::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for CmpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

fn format_pki_error(
    status: PkiStatus,
    fail_info: &Option<PkiFailureInfo>,
    texts: &[String],
) -> String {
    let mut out = format!("CA returned status {status}");
    if let Some(info) = fail_info {
        if !info.is_empty() {
            out.push_str(&format!(" ({info})"));
        }
    }
    if !texts.is_empty() {
        out.push_str(": ");
        out.push_str(&texts.join("; "));
    }
    out
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
