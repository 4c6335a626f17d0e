//! Thin request helpers shared by the chat backends and the video resolver.
//!
//! Every request gets a timeout and a body size cap. Remote endpoints here are
//! third-party contracts that change without notice, so responses are read
//! fully into memory and decoded by the caller.

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

const MAX_BODY_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Errors from a single HTTP round trip.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    /// Body arrived but did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    /// True for statuses that mean the bearer token is no longer accepted.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::HttpStatus(401) | FetchError::HttpStatus(403))
    }
}

/// Request options shared by all helpers.
#[derive(Clone, Copy)]
pub struct RequestOptions<'a> {
    pub timeout: Duration,
    pub bearer: Option<&'a SecretString>,
}

impl<'a> RequestOptions<'a> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            bearer: None,
        }
    }

    pub fn with_bearer(mut self, token: &'a SecretString) -> Self {
        self.bearer = Some(token);
        self
    }
}

/// GET a URL and return the body as text.
pub async fn get_text(
    client: &reqwest::Client,
    url: &str,
    opts: RequestOptions<'_>,
) -> Result<String, FetchError> {
    let bytes = send(client.get(url), opts).await?;
    String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)
}

/// GET a URL and decode the body as JSON.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    opts: RequestOptions<'_>,
) -> Result<T, FetchError> {
    let bytes = send(client.get(url), opts).await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

/// POST a JSON body and decode the JSON response.
pub async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    opts: RequestOptions<'_>,
) -> Result<T, FetchError> {
    let payload = serde_json::to_vec(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    let request = client
        .post(url)
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body(payload);
    let bytes = send(request, opts).await?;
    serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
}

async fn send(
    mut request: reqwest::RequestBuilder,
    opts: RequestOptions<'_>,
) -> Result<Vec<u8>, FetchError> {
    if let Some(token) = opts.bearer {
        request = request.header(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", token.expose_secret()),
        );
    }

    let response = tokio::time::timeout(opts.timeout, request.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    tokio::time::timeout(opts.timeout, read_limited_bytes(response, MAX_BODY_SIZE))
        .await
        .map_err(|_| FetchError::Timeout)?
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
