//! API transaction engine.
//!
//! Requests travel as JSON arrays POSTed to `/cs?id=<callId>` with an
//! optional session parameter. The call id is a per-client counter
//! bumped once per logical batch; retries of the same batch reuse it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::sleep;

use crate::api::error::api_error;
use crate::error::{MegaError, Result};
use crate::http::{HttpClient, Transport};

/// Base URL for API requests.
const API_URL: &str = "https://g.api.mega.co.nz/cs";

/// Backoff configuration for transient transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// First delay after a `busy`/`no_response` failure.
    pub initial: Duration,
    /// Delay ceiling; doubling stops here.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(120_000),
        }
    }
}

/// Which query parameter carries the session id.
///
/// Authenticated sessions use `sid`; exported-folder sessions pass the
/// folder handle under `n` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SidParam {
    #[serde(rename = "sid")]
    Session,
    #[serde(rename = "n")]
    Folder,
}

impl SidParam {
    pub fn as_str(&self) -> &'static str {
        match self {
            SidParam::Session => "sid",
            SidParam::Folder => "n",
        }
    }
}

/// API client: owns the call-id counter and the session id.
pub struct ApiClient<T: Transport = HttpClient> {
    transport: T,
    call_id: u64,
    sid: Option<String>,
    sid_param: SidParam,
    pub retry: RetryPolicy,
}

impl ApiClient<HttpClient> {
    pub fn new() -> Self {
        Self::with_transport(HttpClient::new())
    }

    pub fn with_proxy(proxy: &str) -> Result<Self> {
        Ok(Self::with_transport(HttpClient::with_proxy(proxy)?))
    }
}

impl Default for ApiClient<HttpClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> ApiClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            call_id: 0,
            sid: None,
            sid_param: SidParam::Session,
            retry: RetryPolicy::default(),
        }
    }

    /// Attach a session id to subsequent requests.
    pub fn set_session_id(&mut self, sid: String, param: SidParam) {
        self.sid = Some(sid);
        self.sid_param = param;
    }

    pub fn clear_session_id(&mut self) {
        self.sid = None;
        self.sid_param = SidParam::Session;
    }

    pub fn session_id(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    /// Current value of the call-id counter.
    pub fn call_id(&self) -> u64 {
        self.call_id
    }

    fn build_url(&self) -> String {
        match &self.sid {
            Some(sid) => format!(
                "{}?id={}&{}={}",
                API_URL,
                self.call_id,
                self.sid_param.as_str(),
                sid
            ),
            None => format!("{}?id={}", API_URL, self.call_id),
        }
    }

    /// Send a batch of requests and demultiplex the per-slot results.
    ///
    /// One HTTP round trip carries all requests; the response is matched
    /// positionally. A global negative result or a whole-batch transport
    /// failure fails every slot with the same code. Transient transport
    /// failures (`busy`, `no_response`) are retried with exponential
    /// backoff under the same call id; application-level errors are
    /// never retried here.
    pub async fn call_batch(&mut self, requests: &[Value]) -> Result<Vec<Result<Value>>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        self.call_id += 1;
        let url = self.build_url();
        let body = serde_json::to_string(requests)?;

        let mut delay = self.retry.initial;
        let text = loop {
            match self.transport.post(&url, &body).await {
                Ok(text) => break text,
                Err(err) if err.is_transient() => {
                    tracing::debug!(code = %err.code, "transient transport failure, backing off {:?}", delay);
                    sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max);
                }
                Err(err) => return Err(err.into()),
            }
        };

        if text.trim().is_empty() {
            return Err(MegaError::EmptyResponse);
        }
        let response: Value = serde_json::from_str(&text)?;
        Ok(Self::demux(requests.len(), response))
    }

    /// Send a single request; negative results become errors.
    pub async fn call(&mut self, request: Value) -> Result<Value> {
        let mut results = self.call_batch(std::slice::from_ref(&request)).await?;
        results.pop().unwrap_or(Err(MegaError::EmptyResponse))
    }

    /// `call_batch` that can be cancelled through a oneshot handle.
    ///
    /// Firing the handle resolves every slot with [`MegaError::Aborted`].
    /// Dropping the handle without firing leaves the batch running.
    pub async fn call_batch_abortable(
        &mut self,
        requests: &[Value],
        abort: oneshot::Receiver<()>,
    ) -> Result<Vec<Result<Value>>> {
        let n = requests.len();
        let fired = async move {
            match abort.await {
                Ok(()) => (),
                // Handle dropped: never cancel.
                Err(_) => std::future::pending::<()>().await,
            }
        };

        let batch = self.call_batch(requests);
        tokio::pin!(batch);

        tokio::select! {
            res = &mut batch => res,
            _ = fired => Ok((0..n).map(|_| Err(MegaError::Aborted)).collect()),
        }
    }

    /// Positionally match a response body to `n` request slots.
    fn demux(n: usize, response: Value) -> Vec<Result<Value>> {
        // A bare integer is a global verdict for the whole batch.
        if let Some(code) = response.as_i64() {
            if code <= 0 {
                return (0..n).map(|_| Err(api_error(code))).collect();
            }
            return (0..n).map(|_| Err(MegaError::EmptyResponse)).collect();
        }

        match response {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(n);
                let mut items = items.into_iter();
                for _ in 0..n {
                    match items.next() {
                        Some(item) => match item.as_i64() {
                            Some(code) if code < 0 => out.push(Err(api_error(code))),
                            _ => out.push(Ok(item)),
                        },
                        None => out.push(Err(MegaError::EmptyResponse)),
                    }
                }
                out
            }
            _ => (0..n).map(|_| Err(MegaError::EmptyResponse)).collect(),
        }
    }
}
