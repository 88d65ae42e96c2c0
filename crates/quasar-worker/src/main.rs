mod args;
mod handlers;
mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{delete, get, post},
    Router,
};
use clap::Parser;

use quasar_worker::{CpuExecutor, WorkerService};

use crate::args::Args;
use crate::handlers::{
    close_context, create_context, enqueue, healthz, keep_alive, update_context, wait_queue_done,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    quasar_common::telemetry::init_tracing("quasar-worker", &args.log_format);

    let service = Arc::new(WorkerService::new(
        Arc::new(CpuExecutor),
        Duration::from_millis(args.reaper_interval_ms),
    ));
    let worker_name = format!("/job:{}/task:{}", args.job_name, args.task_index);
    tracing::info!(worker = %worker_name, listen_addr = %args.listen_addr, "worker starting");

    let st = AppState {
        service,
        worker_name,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/contexts", post(create_context))
        .route("/v1/contexts/:id/update", post(update_context))
        .route("/v1/contexts/:id/enqueue", post(enqueue))
        .route("/v1/contexts/:id/wait", post(wait_queue_done))
        .route("/v1/contexts/:id/keep_alive", post(keep_alive))
        .route("/v1/contexts/:id", delete(close_context))
        .with_state(st);

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
