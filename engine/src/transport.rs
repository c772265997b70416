//! Remote transport adapters.
//!
//! The engine needs two things from the network: an incremental read of a
//! collection since a watermark, and a submission of one record. Failures are
//! not errors here. Everything resolves to an HTTP-like status code, with
//! [`NO_CONNECTION`] reserved for an unreachable remote.

use crate::{error::Result, Error, Timestamp};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::watch;

/// Status reported when the remote could not be reached at all.
pub const NO_CONNECTION: u16 = 0;

pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Result of an incremental read.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub data: Value,
}

impl FetchResponse {
    pub fn ok(data: Value) -> Self {
        Self { status: 200, data }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            data: Value::Null,
        }
    }

    pub fn unreachable() -> Self {
        Self::status(NO_CONNECTION)
    }

    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }
}

/// Network access to the remote source of truth.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Records created or updated after `since`.
    async fn fetch(&self, endpoint: &str, since: Timestamp) -> FetchResponse;

    /// Submit one record and report the response status.
    async fn submit(&self, endpoint: &str, body: &Value) -> u16;
}

/// HTTP transport over `reqwest`.
///
/// The watermark is appended verbatim to the read endpoint, so endpoints are
/// declared with their query prefix, e.g. `https://host/api/todos?after=`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, endpoint: &str, since: Timestamp) -> FetchResponse {
        let url = format!("{endpoint}{since}");
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "fetch failed to reach remote");
                return FetchResponse::unreachable();
            }
        };

        let status = response.status().as_u16();
        if !is_success(status) {
            tracing::debug!(url = %url, status, "fetch returned non-success status");
            return FetchResponse::status(status);
        }

        match response.json::<Value>().await {
            Ok(data) => FetchResponse { status, data },
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "fetch returned an unreadable body");
                FetchResponse::unreachable()
            }
        }
    }

    async fn submit(&self, endpoint: &str, body: &Value) -> u16 {
        match self.client.post(endpoint).json(body).send().await {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                tracing::debug!(url = %endpoint, error = %e, "submit failed to reach remote");
                NO_CONNECTION
            }
        }
    }
}

/// A scripted transport for testing.
///
/// Responses are queued per endpoint and consumed in order; once a queue runs
/// dry the defaults apply (an empty `200` for fetches, `default_submit` for
/// submissions). Fetches can be parked with [`MockTransport::pause`] to hold a
/// sync cycle in flight.
#[derive(Debug)]
pub struct MockTransport {
    script: Mutex<Script>,
    paused: watch::Sender<bool>,
}

#[derive(Debug)]
struct Script {
    fetches: HashMap<String, VecDeque<FetchResponse>>,
    submits: HashMap<String, VecDeque<u16>>,
    default_submit: u16,
    offline: bool,
    fetch_log: Vec<(String, Timestamp)>,
    submit_log: Vec<(String, Value)>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            script: Mutex::new(Script {
                fetches: HashMap::new(),
                submits: HashMap::new(),
                default_submit: 200,
                offline: false,
                fetch_log: Vec::new(),
                submit_log: Vec::new(),
            }),
            paused,
        }
    }

    /// Queue the next response for a read endpoint.
    pub fn push_fetch(&self, endpoint: &str, response: FetchResponse) {
        self.script
            .lock()
            .fetches
            .entry(endpoint.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue the next statuses for a submission endpoint.
    pub fn push_submits(&self, endpoint: &str, statuses: impl IntoIterator<Item = u16>) {
        self.script
            .lock()
            .submits
            .entry(endpoint.to_string())
            .or_default()
            .extend(statuses);
    }

    pub fn set_default_submit(&self, status: u16) {
        self.script.lock().default_submit = status;
    }

    /// While offline every call reports [`NO_CONNECTION`].
    pub fn set_offline(&self, offline: bool) {
        self.script.lock().offline = offline;
    }

    /// Park every fetch until [`MockTransport::resume`].
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Endpoint and watermark of every fetch so far.
    pub fn fetches(&self) -> Vec<(String, Timestamp)> {
        self.script.lock().fetch_log.clone()
    }

    /// Endpoint and body of every submission so far.
    pub fn submissions(&self) -> Vec<(String, Value)> {
        self.script.lock().submit_log.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, endpoint: &str, since: Timestamp) -> FetchResponse {
        let mut paused = self.paused.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = paused.wait_for(|held| !*held).await;

        let mut script = self.script.lock();
        script.fetch_log.push((endpoint.to_string(), since));
        if script.offline {
            return FetchResponse::unreachable();
        }
        script
            .fetches
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| FetchResponse::ok(Value::Array(Vec::new())))
    }

    async fn submit(&self, endpoint: &str, body: &Value) -> u16 {
        let mut script = self.script.lock();
        script.submit_log.push((endpoint.to_string(), body.clone()));
        if script.offline {
            return NO_CONNECTION;
        }
        let fallback = script.default_submit;
        script
            .submits
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or(fallback)
    }
}
