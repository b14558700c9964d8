//! HTTP transport for API requests.
//!
//! The transaction engine talks to the server through the [`Transport`]
//! trait so it can be driven by an in-memory stub in tests. The default
//! implementation is a thin reqwest wrapper.

use std::future::Future;

use reqwest::Client;

use crate::error::MegaError;

/// A transport-level failure, before the service protocol is involved.
///
/// `code` is transport-defined; `busy` and `no_response` mark transient
/// conditions the engine retries with backoff.
#[derive(Debug, Clone)]
pub struct TransportError {
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this failure should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self.code.as_str(), "busy" | "no_response")
    }
}

impl From<TransportError> for MegaError {
    fn from(e: TransportError) -> Self {
        MegaError::Transport {
            code: e.code,
            message: e.message,
        }
    }
}

/// Something that can POST a JSON body and return the response body.
pub trait Transport: Send + Sync {
    fn post(
        &self,
        url: &str,
        body: &str,
    ) -> impl Future<Output = std::result::Result<String, TransportError>> + Send;
}

impl<T: Transport> Transport for std::sync::Arc<T> {
    fn post(
        &self,
        url: &str,
        body: &str,
    ) -> impl Future<Output = std::result::Result<String, TransportError>> + Send {
        (**self).post(url, body)
    }
}

/// reqwest-backed transport.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a client that routes through a proxy
    /// (e.g. `http://proxy:8080` or `socks5://proxy:1080`).
    pub fn with_proxy(proxy: &str) -> crate::error::Result<Self> {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| MegaError::Custom(format!("Invalid proxy: {e}")))?;
        let client = Client::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| MegaError::Custom(format!("Failed to build client: {e}")))?;
        Ok(Self { client })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpClient {
    async fn post(&self, url: &str, body: &str) -> std::result::Result<String, TransportError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(TransportError::new("busy", format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(TransportError::new(
                status.as_u16().to_string(),
                format!("HTTP {status}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| TransportError::new("no_response", e.to_string()))
    }
}

fn classify_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        TransportError::new("no_response", e.to_string())
    } else {
        TransportError::new("transport", e.to_string())
    }
}
