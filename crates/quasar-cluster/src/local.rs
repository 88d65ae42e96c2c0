use std::sync::Arc;

use async_trait::async_trait;

use quasar_common::{
    CreateContextRequest, EnqueueRequest, EnqueueResponse, Error, UpdateContextRequest,
};
use quasar_worker::WorkerService;

use crate::client::WorkerClient;

/// In-process client: forwards calls directly to a co-located service
/// instance. The test-double substitution for the network layer; also
/// used when the target worker happens to be this process.
pub struct InProcessClient {
    service: Arc<WorkerService>,
}

impl InProcessClient {
    pub fn new(service: Arc<WorkerService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl WorkerClient for InProcessClient {
    async fn create_context(&self, req: CreateContextRequest) -> Result<(), Error> {
        self.service.create_context(&req)
    }

    async fn update_context(&self, req: UpdateContextRequest) -> Result<(), Error> {
        self.service.update_context(&req)
    }

    async fn enqueue(&self, req: EnqueueRequest) -> Result<EnqueueResponse, Error> {
        self.service.enqueue(&req).await
    }

    async fn wait_queue_done(&self, context_id: u64) -> Result<(), Error> {
        self.service.wait_queue_done(context_id).await
    }

    async fn keep_alive(&self, context_id: u64) -> Result<(), Error> {
        self.service.keep_alive(context_id)
    }

    async fn close_context(&self, context_id: u64) -> Result<(), Error> {
        self.service.close_context(context_id)
    }
}
