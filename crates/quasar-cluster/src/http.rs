use async_trait::async_trait;

use quasar_common::{
    CreateContextRequest, EnqueueRequest, EnqueueResponse, Error, UpdateContextRequest,
};

use crate::client::WorkerClient;

/// HTTP client speaking the worker's axum surface.
pub struct HttpWorkerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response back into the shared error taxonomy.
    /// The worker reports batch failures with a `failed_index` field,
    /// which is folded back into a QueueItem error.
    async fn check(resp: reqwest::Response, context_id: u64) -> Result<reqwest::Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body: serde_json::Value = resp.json().await.unwrap_or_default();
        let message = body["error"]["message"]
            .as_str()
            .unwrap_or("worker returned an error")
            .to_string();
        let failed_index = body["error"]["failed_index"].as_u64();

        let err = match status.as_u16() {
            404 => Error::ContextNotFound(context_id),
            409 => Error::ContextAlreadyExists(context_id),
            400 => Error::InvalidArgument(message),
            503 => Error::Unavailable(message),
            _ => Error::Execution(message),
        };
        match failed_index {
            Some(index) if !err.is_not_found() => Err(Error::QueueItem {
                index: index as usize,
                source: Box::new(err),
            }),
            _ => Err(err),
        }
    }

    async fn post_empty(&self, path: &str, context_id: u64) -> Result<(), Error> {
        let resp = self
            .http
            .post(self.url(path))
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Self::check(resp, context_id).await?;
        Ok(())
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn create_context(&self, req: CreateContextRequest) -> Result<(), Error> {
        let resp = self
            .http
            .post(self.url("/v1/contexts"))
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Self::check(resp, req.context_id).await?;
        Ok(())
    }

    async fn update_context(&self, req: UpdateContextRequest) -> Result<(), Error> {
        let resp = self
            .http
            .post(self.url(&format!("/v1/contexts/{}/update", req.context_id)))
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Self::check(resp, req.context_id).await?;
        Ok(())
    }

    async fn enqueue(&self, req: EnqueueRequest) -> Result<EnqueueResponse, Error> {
        let resp = self
            .http
            .post(self.url(&format!("/v1/contexts/{}/enqueue", req.context_id)))
            .json(&req)
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        let resp = Self::check(resp, req.context_id).await?;
        resp.json()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))
    }

    async fn wait_queue_done(&self, context_id: u64) -> Result<(), Error> {
        self.post_empty(&format!("/v1/contexts/{}/wait", context_id), context_id)
            .await
    }

    async fn keep_alive(&self, context_id: u64) -> Result<(), Error> {
        self.post_empty(
            &format!("/v1/contexts/{}/keep_alive", context_id),
            context_id,
        )
        .await
    }

    async fn close_context(&self, context_id: u64) -> Result<(), Error> {
        let resp = self
            .http
            .delete(self.url(&format!("/v1/contexts/{}", context_id)))
            .send()
            .await
            .map_err(|e| Error::Unavailable(e.to_string()))?;
        Self::check(resp, context_id).await?;
        Ok(())
    }
}
