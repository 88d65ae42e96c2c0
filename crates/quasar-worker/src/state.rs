use std::sync::Arc;

use quasar_worker::WorkerService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<WorkerService>,
    pub worker_name: String,
}
