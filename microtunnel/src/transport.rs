//! Request/response transport seam and its reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder};

use crate::error::TransportError;

const OCTET_STREAM: &str = "application/octet-stream";

/// Raw byte exchange with one endpoint URL.
///
/// Non-2xx responses are errors. Implementations must not follow redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Bytes, TransportError>;

    async fn get(&self, url: &str) -> Result<Bytes, TransportError>;
}

/// HTTP transport over a pooled keep-alive `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| TransportError::Client(format!("invalid user agent: {e}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .user_agent(user_agent)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Bytes, TransportError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<Bytes, TransportError> {
        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, OCTET_STREAM)
            .body(body);
        self.send(url, request).await
    }

    async fn get(&self, url: &str) -> Result<Bytes, TransportError> {
        self.send(url, self.client.get(url)).await
    }
}
