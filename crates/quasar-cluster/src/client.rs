use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use quasar_common::{
    CreateContextRequest, EnqueueRequest, EnqueueResponse, Error, UpdateContextRequest,
};

/// Communication client for one remote worker, mirroring the service
/// boundary. Production uses the HTTP implementation; tests forward
/// in-process to another service instance.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    async fn create_context(&self, req: CreateContextRequest) -> Result<(), Error>;
    async fn update_context(&self, req: UpdateContextRequest) -> Result<(), Error>;
    async fn enqueue(&self, req: EnqueueRequest) -> Result<EnqueueResponse, Error>;
    async fn wait_queue_done(&self, context_id: u64) -> Result<(), Error>;
    async fn keep_alive(&self, context_id: u64) -> Result<(), Error>;
    async fn close_context(&self, context_id: u64) -> Result<(), Error>;
}

/// Maps a worker name (`/job:<job>/task:<n>`) to a communication client.
pub trait ClientResolver: Send + Sync {
    fn client_for(&self, worker: &str) -> Result<Arc<dyn WorkerClient>, Error>;
}

/// Fixed-topology resolver over a concurrent map. Suitable for static
/// clusters and for wiring in-process clients in tests.
#[derive(Default)]
pub struct StaticResolver {
    clients: DashMap<String, Arc<dyn WorkerClient>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, worker: impl Into<String>, client: Arc<dyn WorkerClient>) {
        self.clients.insert(worker.into(), client);
    }
}

impl ClientResolver for StaticResolver {
    fn client_for(&self, worker: &str) -> Result<Arc<dyn WorkerClient>, Error> {
        self.clients
            .get(worker)
            .map(|c| c.clone())
            .ok_or_else(|| Error::Unavailable(format!("no client for worker '{}'", worker)))
    }
}
