//! HTTP transport for the planwise REST API
//!
//! Sends a single [`ApiRequest`] and maps the outcome onto the error
//! taxonomy. It never retries; retry-after-refresh lives in the gateway.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{Error, Result};

use super::envelope::Envelope;
use super::request::ApiRequest;

/// HTTP client for the backend API
#[derive(Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a new transport from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config.base_url.trim().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request, attaching `Authorization: Bearer <token>` when a
    /// token is given.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        token: Option<&str>,
    ) -> Result<Envelope<T>> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .http_client
            .request(request.method.into(), &url);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::Unexpected(format!("invalid access token: {}", e)))?;
            builder = builder.header(AUTHORIZATION, value);
        }

        tracing::debug!(request = %request.describe(), authorized = token.is_some(), "Sending request");

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Connectivity(format!("failed to read response body: {}", e)))?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(empty_envelope());
            }
            let envelope: Envelope<T> = serde_json::from_slice(&bytes).map_err(|e| {
                Error::Unexpected(format!(
                    "failed to parse response for {}: {}",
                    request.describe(),
                    e
                ))
            })?;
            if !envelope.success {
                return Err(Error::Remote {
                    status: Some(status.as_u16()),
                    message: envelope
                        .failure_message()
                        .unwrap_or("request failed")
                        .to_string(),
                });
            }
            return Ok(envelope);
        }

        let message = error_message(&bytes).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        tracing::debug!(
            request = %request.describe(),
            status = status.as_u16(),
            "Request failed: {}",
            message
        );

        if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(Error::Auth(message))
        } else {
            Err(Error::Remote {
                status: Some(status.as_u16()),
                message,
            })
        }
    }
}

fn empty_envelope<T>() -> Envelope<T> {
    Envelope {
        success: true,
        data: None,
        error: None,
        message: None,
        pagination: None,
    }
}

/// Pull a message out of an error body, which may or may not be an envelope
fn error_message(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    if let Ok(envelope) = serde_json::from_slice::<Envelope<serde_json::Value>>(body) {
        if let Some(message) = envelope.failure_message() {
            return Some(message.to_string());
        }
    }
    let text = String::from_utf8_lossy(body).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Failures where no response was received become connectivity errors
fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Connectivity(format!("request timed out: {}", e))
    } else if e.is_connect() || e.is_request() {
        Error::Connectivity(format!("HTTP request failed: {}", e))
    } else {
        Error::Unexpected(format!("HTTP request failed: {}", e))
    }
}
