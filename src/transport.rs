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

//! Byte transport between the client and a CA.
//!
//! The enrollment state machine only needs "send these bytes, give me the
//! reply". [`HttpTransport`] implements that as CMP over HTTP (RFC 6712);
//! tests substitute their own [`Transport`].

use async_trait::async_trait;
use base64::prelude::*;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::config::{CmpClientConfig, DEFAULT_MAX_RESPONSE_SIZE};
use crate::error::{CmpError, Result};
use crate::tls::build_http_client;
use crate::types::content_types;

/// Request/response exchange with a CA endpoint.
///
/// Implementations never retry; a failed exchange is reported once as
/// [`CmpError::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `request` to `endpoint` and return the response body.
    async fn exchange(&self, endpoint: &Url, request: &[u8]) -> Result<Vec<u8>>;
}

/// CMP over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    max_response_size: usize,
}

impl HttpTransport {
    /// Create a transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if TLS configuration fails.
    pub fn new(config: &CmpClientConfig) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            max_response_size: config.max_response_size,
        })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }

    /// Read the body, failing once it grows past the size limit.
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>> {
        let limit = self.max_response_size;
        if response.content_length().is_some_and(|length| length > limit as u64) {
            return Err(response_too_large(limit));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(response_too_large(limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Map a non-success response to an error.
    async fn handle_error_response(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let message = self
            .read_body(response)
            .await
            .ok()
            .map(|body| String::from_utf8_lossy(&body).into_owned())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

        Err(CmpError::transport(format!(
            "CA returned HTTP {}: {}",
            status.as_u16(),
            message
        )))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, endpoint: &Url, request: &[u8]) -> Result<Vec<u8>> {
        tracing::debug!("POST {}", endpoint);
        tracing::trace!("CMP request: {}", BASE64_STANDARD.encode(request));

        let response = self
            .http
            .post(endpoint.clone())
            .header(CONTENT_TYPE, content_types::PKIXCMP)
            .body(request.to_vec())
            .send()
            .await?;

        let response = self.handle_error_response(response).await?;

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !content_type.starts_with(content_types::PKIXCMP) {
                tracing::warn!("Unexpected response content type: {}", content_type);
            }
        }

        let body = self.read_body(response).await?;
        if body.is_empty() {
            return Err(CmpError::transport("CA returned an empty response"));
        }

        tracing::trace!("CMP response: {}", BASE64_STANDARD.encode(&body));
        Ok(body)
    }
}

fn response_too_large(limit: usize) -> CmpError {
    CmpError::transport(format!("CA response exceeds {limit} bytes"))
}
