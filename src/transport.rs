//! Transport: one GET against one mirror.

use crate::config::FetchConfig;
use crate::error::{AttemptError, Result};
use crate::format::Format;
use async_trait::async_trait;

/// Performs a single document request
///
/// Implementations carry their own per-request timeouts; callers never wrap
/// them in a deadline.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET url`, asking for `accept`; any 2xx answer yields the raw body
    async fn fetch(&self, url: &str, accept: Format) -> std::result::Result<Vec<u8>, AttemptError>;
}

/// HTTP transport backed by a shared [`reqwest::Client`]
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the connect/read timeouts and user agent of `config`
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, accept: Format) -> std::result::Result<Vec<u8>, AttemptError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept.mime_type())
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status {
                code: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(classify)?;
        Ok(body.to_vec())
    }
}

fn classify(e: reqwest::Error) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Timeout
    } else {
        AttemptError::Transport(e)
    }
}
