//! HTTP client for fetching images.

use crate::retry::FailureClass;
use bytes::Bytes;
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Fetch failure, split by whether the server produced an interpretable
/// response. The split drives the retry policy: only transient failures get
/// another attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status}: {message}")]
    Permanent { status: u16, message: String },

    #[error("transport error: {message}")]
    Transient { message: String },
}

impl FetchError {
    pub fn class(&self) -> FailureClass {
        match self {
            FetchError::Permanent { .. } => FailureClass::Permanent,
            FetchError::Transient { .. } => FailureClass::Transient,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// User-Agent rotation pool.
///
/// Each fetch presents a randomly chosen browser identifier so a long run
/// does not hit the source with one synthetic client string. The random
/// source is supplied by the caller, which keeps the rotation seedable in
/// tests.
#[derive(Debug, Clone)]
pub struct AgentPool {
    agents: Vec<String>,
}

impl AgentPool {
    pub fn builtin() -> Self {
        Self {
            agents: [
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
                "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }

    pub fn pick(&self, rng: &mut impl Rng) -> &str {
        &self.agents[rng.gen_range(0..self.agents.len())]
    }
}

/// Thin wrapper over `reqwest::Client` that classifies failures.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    /// Issue a single GET and return the full body.
    ///
    /// Status errors are `Permanent`; everything without an interpretable
    /// response (connect failure, timeout, truncated body) is `Transient`.
    pub async fn fetch(&self, url: &str, user_agent: &str) -> Result<Bytes, FetchError> {
        debug!(url, "starting fetch");

        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .map_err(|e| FetchError::Transient {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Permanent {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown status").to_string(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Transient {
            message: format!("failed to read body: {e}"),
        })?;

        debug!(url, size = bytes.len(), "fetch complete");
        Ok(bytes)
    }
}
