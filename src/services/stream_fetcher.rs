//! Network fetch capability shared by the liveness prober and playback
//! content-type classification.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

use crate::config::ProberConfig;
use crate::errors::{AppResult, ProbeError, ProbeResult};

/// Status line and content type of a fetch; the body is never read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
}

impl FetchResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: None,
        }
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Media type without parameters, lower-cased (`video/MP4; codecs=..` -> `video/mp4`)
    pub fn mime_type(&self) -> Option<String> {
        self.content_type.as_deref().map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Turn a non-success status into a [`ProbeError::Status`]
    pub fn error_for_status(self) -> ProbeResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ProbeError::Status {
                status: self.status,
            })
        }
    }
}

/// HEAD/GET capability; callers apply their own time budget
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn head(&self, url: &str) -> ProbeResult<FetchResponse>;
    async fn get(&self, url: &str) -> ProbeResult<FetchResponse>;
}

/// [`StreamFetcher`] backed by a reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ProberConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.probe_timeout)
            .build()?;
        Ok(Self::new(client))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ProbeResult<FetchResponse> {
        let response = request.send().await.map_err(|e| ProbeError::Transport {
            message: e.to_string(),
        })?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        trace!(
            "{} answered {} ({:?})",
            response.url(),
            response.status(),
            content_type
        );

        // Dropping the response here closes the body without downloading it
        Ok(FetchResponse {
            status: response.status().as_u16(),
            content_type,
        })
    }
}

#[async_trait]
impl StreamFetcher for ReqwestFetcher {
    async fn head(&self, url: &str) -> ProbeResult<FetchResponse> {
        self.send(self.client.head(url)).await
    }

    async fn get(&self, url: &str) -> ProbeResult<FetchResponse> {
        self.send(self.client.get(url)).await
    }
}
