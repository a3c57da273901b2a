use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};

use crate::error::ModelError;
use crate::prompt::GenerateRequest;

/// Status and raw body of an HTTP exchange.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam of the model client. Non-2xx statuses are returned, not
/// raised; only connection-level failures are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Download the document. Failures map to [`ModelError::Fetch`]; a
    /// successful body longer than `max_bytes` is abandoned with
    /// [`ModelError::Size`] instead of being read to the end.
    async fn fetch(&self, url: &str, max_bytes: usize) -> Result<HttpResponse, ModelError>;

    /// POST a generation request. Failures map to [`ModelError::Transport`].
    async fn generate(
        &self,
        endpoint: &str,
        api_key: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<HttpResponse, ModelError>;
}

pub struct ReqwestTransport {
    client: Client,
    fetch_timeout: Duration,
    generate_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(fetch_timeout: Duration, generate_timeout: Duration) -> Result<Self, ModelError> {
        let client = Client::builder()
            .redirect(Policy::limited(5))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            fetch_timeout,
            generate_timeout,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, url: &str, max_bytes: usize) -> Result<HttpResponse, ModelError> {
        let mut resp = self
            .client
            .get(url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| ModelError::Fetch(e.to_string()))?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Ok(HttpResponse { status, body: Vec::new() });
        }
        if let Some(declared) = resp.content_length() {
            let declared = usize::try_from(declared).unwrap_or(usize::MAX);
            if declared > max_bytes {
                return Err(ModelError::Size { bytes: declared });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| ModelError::Fetch(e.to_string()))? {
            body.extend_from_slice(&chunk);
            if body.len() > max_bytes {
                return Err(ModelError::Size { bytes: body.len() });
            }
        }
        Ok(HttpResponse { status, body })
    }

    async fn generate(
        &self,
        endpoint: &str,
        api_key: &str,
        request: &GenerateRequest<'_>,
    ) -> Result<HttpResponse, ModelError> {
        let resp = self
            .client
            .post(endpoint)
            .header("x-goog-api-key", api_key)
            .json(request)
            .timeout(self.generate_timeout)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
