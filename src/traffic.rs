//! Test requests through a deployed proxy
//!
//! A freshly deployed proxy may refuse connections for a while after its
//! anchor appears. Requests are retried until any HTTP response arrives or the
//! request timeout passes; only then is the status checked.
//!
//! # Example
//!
//! ```ignore
//! use gatecheck::traffic::{TestRequest, TrafficProbe};
//!
//! let probe = TrafficProbe::from_config(&config)?;
//! let response = probe.expect_ok(&TestRequest::get("http://localhost:8081/api")).await?;
//! assert!(response.body.contains("orders"));
//! ```

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode, Url};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::GatewayConfig;
use crate::wait::{deadline_after, eventually, WaitError};

/// Error type for test requests
#[derive(Debug, thiserror::Error)]
pub enum TrafficError {
    #[error("invalid request URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{url} did not answer\n{error}")]
    Unreachable { url: String, error: WaitError },

    #[error("HTTP request should be successful: {method} {url} returned {actual}, expected {expected}")]
    UnexpectedStatus {
        method: Method,
        url: String,
        expected: StatusCode,
        actual: StatusCode,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("response from {url} was lost")]
    Lost { url: String },
}

/// A request to send through the proxy
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

impl TestRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    /// POST `body` as `text/plain`
    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: Some(body.into()),
        }
    }
}

/// What came back from the proxy
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: String,
    /// Requests sent before one was answered
    pub attempts: u32,
}

/// Sends test requests, retrying until the target answers
#[derive(Debug, Clone)]
pub struct TrafficProbe {
    client: Client,
    timeout: Duration,
    interval: Duration,
}

impl TrafficProbe {
    /// Probe with default timing: 10s timeout, 500ms interval
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(500),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, TrafficError> {
        Ok(Self::new(Client::builder().build()?)
            .timeout(config.request_timeout)
            .interval(config.poll_interval))
    }

    /// Set how long to keep retrying
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between attempts
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Send `request` until an HTTP response arrives
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn send(&self, request: &TestRequest) -> Result<ProxyResponse, TrafficError> {
        let url = Url::parse(&request.url).map_err(|e| TrafficError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

        info!("Making HTTP call");
        let answered: Mutex<Option<(StatusCode, String)>> = Mutex::new(None);
        let last_error: Mutex<String> = Mutex::new("no attempt made".to_string());
        let deadline = deadline_after(Instant::now(), self.timeout);

        let waited = eventually(&request.url, || {
            let (answered, last_error) = (&answered, &last_error);
            let url = url.clone();
            async move {
                let timeout = self.attempt_timeout(deadline);
                match self.attempt(request, url, timeout).await {
                    Ok(reply) => {
                        if let Ok(mut slot) = answered.lock() {
                            *slot = Some(reply);
                        }
                        true
                    }
                    Err(e) => {
                        debug!(error = %e, "Proxy not answering yet");
                        if let Ok(mut slot) = last_error.lock() {
                            *slot = e.to_string();
                        }
                        false
                    }
                }
            }
        })
        .timeout(self.timeout)
        .interval(self.interval)
        .await_condition()
        .await;

        let waited = waited.map_err(|error| TrafficError::Unreachable {
            url: request.url.clone(),
            error: error.with_state(last_error.into_inner().unwrap_or_default()),
        })?;

        match answered.into_inner().ok().flatten() {
            Some((status, body)) => {
                info!(status = status.as_u16(), "HTTP response");
                Ok(ProxyResponse {
                    status,
                    body,
                    attempts: waited.attempts,
                })
            }
            None => Err(TrafficError::Lost {
                url: request.url.clone(),
            }),
        }
    }

    /// Send `request` and require a 200 response
    pub async fn expect_ok(&self, request: &TestRequest) -> Result<ProxyResponse, TrafficError> {
        let response = self.send(request).await?;
        if response.status != StatusCode::OK {
            return Err(TrafficError::UnexpectedStatus {
                method: request.method.clone(),
                url: request.url.clone(),
                expected: StatusCode::OK,
                actual: response.status,
            });
        }
        Ok(response)
    }

    /// Time left before `deadline`, but never less than one interval
    fn attempt_timeout(&self, deadline: Instant) -> Duration {
        deadline
            .saturating_duration_since(Instant::now())
            .max(self.interval)
    }

    async fn attempt(
        &self,
        request: &TestRequest,
        url: Url,
        timeout: Duration,
    ) -> Result<(StatusCode, String), reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .timeout(timeout);
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "text/plain")
                .body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}
