//! # Gallery Net
//!
//! HTTP plumbing for the Gallery client runtime: request/response value
//! types, the `Network` fetch seam, and a reqwest-backed client.
//!
//! ## Design Goals
//!
//! 1. **Cloneable responses**: side channels (caching, JSON parsing) work
//!    on cheap clones while the original body is delivered untouched
//! 2. **Pluggable fetch**: everything network-facing goes through the
//!    [`Network`] trait so tests can substitute an in-memory backend
//! 3. **No retries**: a failed fetch is reported once; callers decide

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tracing::trace;
use url::Url;

/// Errors that can occur while fetching.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            url,
            method: Method::POST,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check whether the caller already supplied an Authorization header.
    pub fn has_authorization(&self) -> bool {
        self.headers.contains_key(AUTHORIZATION)
    }

    /// Attach a bearer token, unless the caller already supplied one.
    pub fn bearer(mut self, token: &str) -> Self {
        if !self.has_authorization() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                self.headers.insert(AUTHORIZATION, value);
            }
        }
        self
    }

    /// Identity of this request for cache partitions keyed by method+URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    /// Create a response from parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a `302 Found` redirect to the given location.
    pub fn redirect(location: &str) -> Result<Self, NetError> {
        let value = HeaderValue::from_str(location)
            .map_err(|_| NetError::InvalidUrl(location.to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, value);
        Ok(Self {
            status: StatusCode::FOUND,
            headers,
            body: Bytes::new(),
        })
    }

    /// Synthesize a `200 OK` JSON response from a payload.
    pub fn json_payload(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(Self {
            status: StatusCode::OK,
            headers,
            body: Bytes::from(body),
        })
    }

    /// Check if the response is a success (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Parse the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// The fetch seam.
///
/// One suspension point per call, no retries. Implemented by
/// [`HttpClient`] for real traffic and by in-memory fakes in tests.
pub trait Network: Send + Sync {
    /// Perform a network fetch.
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetError>>;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string.
    pub user_agent: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "GalleryClient/0.1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Reqwest-backed [`Network`] implementation.
pub struct HttpClient {
    inner: reqwest::Client,
    config: ClientConfig,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self, NetError> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self, NetError> {
        let inner = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { inner, config })
    }
}

impl Network for HttpClient {
    fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, NetError>> {
        let client = self.inner.clone();
        let timeout = self.config.timeout;
        Box::pin(async move {
            trace!(method = %request.method, url = %request.url, "fetch");
            let mut builder = client
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
            let response = builder.send().await.map_err(|e| {
                if e.is_timeout() {
                    NetError::Timeout(timeout)
                } else {
                    NetError::Http(e)
                }
            })?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok(Response::new(status, headers, body))
        })
    }
}
