//! KV REST API transport
//!
//! Values live at
//! `{api_base}/accounts/{account}/storage/kv/namespaces/{namespace}/values/{key}`
//! with bearer-token auth. `GET` answers existence (200 exists, 404 absent),
//! `PUT` stores the JSON payload.

use super::retry::{BackoffPolicy, RetryError, TransportError};
use super::{Existence, Transport, WriteOutcome};
use async_trait::async_trait;
use kvseed_common::{KvseedError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use std::fmt;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// HTTP Transport Constants
// ============================================================================

/// Default API root
pub const DEFAULT_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Characters of an error response body kept in failure reasons
const BODY_SNIPPET_CHARS: usize = 200;

/// Account, namespace and token for the KV API
#[derive(Clone, PartialEq, Eq)]
pub struct KvApiCredentials {
    pub account_id: String,
    pub namespace_id: String,
    pub api_token: String,
}

impl fmt::Debug for KvApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvApiCredentials")
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Transport speaking the KV REST API
pub struct HttpTransport {
    client: Client,
    values_url: String,
    api_token: String,
    policy: BackoffPolicy,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("values_url", &self.values_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// Status and body of a response that ends the retry loop
struct Settled {
    status: StatusCode,
    body: String,
}

impl HttpTransport {
    /// Create a transport rooted at `api_base`
    pub fn new(
        api_base: &str,
        credentials: &KvApiCredentials,
        policy: BackoffPolicy,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| KvseedError::network(format!("failed to build HTTP client: {}", e)))?;

        let values_url = format!(
            "{}/accounts/{}/storage/kv/namespaces/{}/values/",
            api_base.trim_end_matches('/'),
            credentials.account_id,
            credentials.namespace_id
        );

        Ok(Self {
            client,
            values_url,
            api_token: credentials.api_token.clone(),
            policy,
        })
    }

    /// Full URL for a key. The key is percent-encoded as one path segment.
    pub fn value_url(&self, key: &str) -> String {
        format!("{}{}", self.values_url, urlencoding::encode(key))
    }

    /// Issue one request. 2xx and 404 settle; everything else is retryable.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        payload: Option<&[u8]>,
    ) -> std::result::Result<Settled, TransportError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(&self.api_token);
        if let Some(bytes) = payload {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.to_vec());
        }

        let response = request.send().await.map_err(|e| {
            TransportError::Retryable(format!("{} failed (no response): {}", method, e))
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(Settled { status, body });
        }

        Err(TransportError::Retryable(format!(
            "{} status {} body={}",
            method,
            status.as_u16(),
            snippet(&body)
        )))
    }

    async fn request_with_retry(
        &self,
        method: Method,
        key: &str,
        payload: Option<&[u8]>,
    ) -> std::result::Result<Settled, RetryError> {
        let url = self.value_url(key);
        let operation = method.to_string();
        self.policy
            .run(&operation, |attempt| {
                debug!(method = %method, key = %key, attempt, "KV request");
                self.attempt(method.clone(), &url, payload)
            })
            .await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn exists(&self, key: &str) -> Existence {
        match self.request_with_retry(Method::GET, key, None).await {
            Ok(settled) if settled.status == StatusCode::NOT_FOUND => Existence::Absent,
            Ok(settled) if settled.status == StatusCode::OK => Existence::Exists,
            Ok(settled) => Existence::Unknown(format!(
                "GET status {} body={}",
                settled.status.as_u16(),
                snippet(&settled.body)
            )),
            Err(e) => Existence::Unknown(e.to_string()),
        }
    }

    async fn write(&self, key: &str, payload: &[u8]) -> WriteOutcome {
        match self.request_with_retry(Method::PUT, key, Some(payload)).await {
            Ok(settled) if settled.status.is_success() => WriteOutcome::Success,
            Ok(settled) => WriteOutcome::Failure(format!(
                "PUT status {} body={}",
                settled.status.as_u16(),
                snippet(&settled.body)
            )),
            Err(e) => WriteOutcome::Failure(e.to_string()),
        }
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_CHARS).collect()
}
