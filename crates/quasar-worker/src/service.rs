use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use quasar_common::{
    CreateContextRequest, EnqueueRequest, EnqueueResponse, Error, Tensor, UpdateContextRequest,
};

use crate::engine::{ExecutionEnv, OpExecutor};
use crate::executor::execute_queue;
use crate::reaper;
use crate::table::{ContextTable, DEFAULT_KEEP_ALIVE_SECS};

/// The worker-side service boundary: context lifecycle, batch enqueue,
/// keep-alive and drain. All calls are keyed by context id and fail with
/// NotFound (naming the id) once a context has been closed or evicted.
pub struct WorkerService {
    table: Arc<ContextTable>,
    executor: Arc<dyn OpExecutor>,
    reaper: Option<JoinHandle<()>>,
}

impl WorkerService {
    /// Build a service with the idle reaper sweeping at `reaper_interval`.
    pub fn new(executor: Arc<dyn OpExecutor>, reaper_interval: Duration) -> Self {
        let table = Arc::new(ContextTable::new());
        let reaper = reaper::spawn(table.clone(), reaper_interval);
        Self {
            table,
            executor,
            reaper: Some(reaper),
        }
    }

    /// Build a service without the background reaper; sweeps must be
    /// driven explicitly. Used by tests and embedders that own their own
    /// scheduling.
    pub fn without_reaper(executor: Arc<dyn OpExecutor>) -> Self {
        Self {
            table: Arc::new(ContextTable::new()),
            executor,
            reaper: None,
        }
    }

    pub fn table(&self) -> &Arc<ContextTable> {
        &self.table
    }

    pub fn create_context(&self, req: &CreateContextRequest) -> Result<(), Error> {
        let keep_alive_secs = if req.keep_alive_secs == 0 {
            DEFAULT_KEEP_ALIVE_SECS
        } else {
            req.keep_alive_secs
        };
        self.table.create(
            req.context_id,
            &req.server_def,
            Duration::from_secs(keep_alive_secs),
            self.executor.clone(),
        )?;
        Ok(())
    }

    /// Bind an externally owned execution environment as a master
    /// context. Master contexts are never auto-evicted.
    pub fn create_master_context(
        &self,
        context_id: u64,
        env: Arc<ExecutionEnv>,
    ) -> Result<(), Error> {
        self.table.register_master(context_id, env)?;
        Ok(())
    }

    pub fn update_context(&self, req: &UpdateContextRequest) -> Result<(), Error> {
        self.table.update(req.context_id, &req.server_def)
    }

    /// Execute an ordered batch against the context. Any successful call
    /// refreshes the context's liveness.
    pub async fn enqueue(&self, req: &EnqueueRequest) -> Result<EnqueueResponse, Error> {
        let ctx = self.table.lookup(req.context_id)?;
        ctx.touch();
        let responses = execute_queue(&ctx, &req.queue).await?;
        ctx.touch();
        Ok(EnqueueResponse { responses })
    }

    /// Returns once every batch enqueued before this call has finished
    /// executing. Concurrently arriving batches are not blocked from
    /// starting afterwards.
    pub async fn wait_queue_done(&self, context_id: u64) -> Result<(), Error> {
        let ctx = self.table.lookup(context_id)?;
        ctx.touch();
        drop(ctx.queue_lock().lock().await);
        Ok(())
    }

    /// Liveness probe: validates the context and resets its idle clock.
    pub fn keep_alive(&self, context_id: u64) -> Result<(), Error> {
        let ctx = self.table.lookup(context_id)?;
        ctx.touch();
        Ok(())
    }

    /// Detach the context and release its handle store. Holders of
    /// in-flight references finish against their own Arc; the execution
    /// environment is torn down when the last one drops.
    pub fn close_context(&self, context_id: u64) -> Result<(), Error> {
        let ctx = self.table.remove(context_id)?;
        ctx.handles().clear();
        tracing::info!(context_id, "context closed");
        Ok(())
    }

    /// Read one materialized value by its remote handle. Primarily for
    /// result retrieval in tests and demos.
    pub fn tensor_handle(
        &self,
        context_id: u64,
        op_id: u64,
        output_index: u32,
    ) -> Result<Tensor, Error> {
        let ctx = self.table.lookup(context_id)?;
        Ok(ctx.handles().get(op_id, output_index)?.tensor)
    }
}

impl Drop for WorkerService {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.take() {
            reaper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quasar_common::{
        AttrValue, FunctionDef, Operation, OperationInput, QueueItem, RemoteTensorHandle,
        ServerDef,
    };

    use crate::engine::CpuExecutor;
    use crate::reaper::sweep_once;

    const DEVICE: &str = "/job:localhost/task:0/device:CPU:0";

    fn service() -> WorkerService {
        WorkerService::without_reaper(Arc::new(CpuExecutor))
    }

    fn create_req(context_id: u64) -> CreateContextRequest {
        CreateContextRequest {
            context_id,
            server_def: ServerDef {
                job_name: "localhost".to_string(),
                task_index: 0,
                devices: vec![],
            },
            keep_alive_secs: 0,
        }
    }

    fn two_by_two() -> Tensor {
        Tensor::matrix(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    fn const_op(id: u64) -> QueueItem {
        QueueItem::Operation(Operation {
            id,
            name: "Const".to_string(),
            device: DEVICE.to_string(),
            attrs: vec![("value".to_string(), AttrValue::Tensor(two_by_two()))],
            inputs: vec![],
        })
    }

    fn matmul_op(id: u64, input: u64) -> QueueItem {
        let remote = OperationInput::Remote(RemoteTensorHandle {
            op_id: input,
            output_index: 0,
            device: DEVICE.to_string(),
        });
        QueueItem::Operation(Operation {
            id,
            name: "MatMul".to_string(),
            device: DEVICE.to_string(),
            attrs: vec![],
            inputs: vec![remote.clone(), remote],
        })
    }

    #[tokio::test]
    async fn test_basic_const_matmul_close() {
        let svc = service();
        svc.create_context(&create_req(1)).unwrap();

        let resp = svc
            .enqueue(&EnqueueRequest {
                context_id: 1,
                queue: vec![const_op(1), matmul_op(2, 1)],
            })
            .await
            .unwrap();
        assert_eq!(resp.responses[1].shapes, vec![vec![2, 2]]);

        let result = svc.tensor_handle(1, 2, 0).unwrap();
        assert_eq!(result.data, vec![7.0, 10.0, 15.0, 22.0]);

        svc.close_context(1).unwrap();
        let err = svc
            .enqueue(&EnqueueRequest {
                context_id: 1,
                queue: vec![const_op(1)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContextNotFound(1)));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let svc = service();
        svc.create_context(&create_req(1)).unwrap();
        let err = svc.create_context(&create_req(1)).unwrap_err();
        assert!(matches!(err, Error::ContextAlreadyExists(1)));
    }

    #[tokio::test]
    async fn test_registered_function_invoked_by_name() {
        let svc = service();
        svc.create_context(&create_req(1)).unwrap();

        // Register in one batch, invoke in a later one with an input
        // produced earlier in that second batch.
        svc.enqueue(&EnqueueRequest {
            context_id: 1,
            queue: vec![QueueItem::RegisterFunction {
                function: FunctionDef::matmul_function(),
            }],
        })
        .await
        .unwrap();

        svc.enqueue(&EnqueueRequest {
            context_id: 1,
            queue: vec![
                const_op(1),
                QueueItem::Operation(Operation {
                    id: 2,
                    name: "MatMulFunction".to_string(),
                    device: DEVICE.to_string(),
                    attrs: vec![],
                    inputs: vec![OperationInput::Remote(RemoteTensorHandle {
                        op_id: 1,
                        output_index: 0,
                        device: DEVICE.to_string(),
                    })],
                }),
            ],
        })
        .await
        .unwrap();

        let result = svc.tensor_handle(1, 2, 0).unwrap();
        assert_eq!(result.data, vec![7.0, 10.0, 15.0, 22.0]);
    }

    #[tokio::test]
    async fn test_keep_alive_unknown_context() {
        let svc = service();
        let err = svc.keep_alive(42).unwrap_err();
        assert!(err
            .to_string()
            .contains("unable to find a context_id matching the specified one"));
    }

    #[tokio::test]
    async fn test_idle_context_evicted_then_not_found() {
        let svc = service();
        svc.table
            .create(
                1,
                &ServerDef::default(),
                Duration::from_millis(20),
                Arc::new(CpuExecutor),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sweep_once(&svc.table), 1);

        assert!(matches!(
            svc.keep_alive(1).unwrap_err(),
            Error::ContextNotFound(1)
        ));
        let err = svc
            .enqueue(&EnqueueRequest {
                context_id: 1,
                queue: vec![const_op(1)],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContextNotFound(1)));
    }

    #[tokio::test]
    async fn test_keep_alive_refresh_prevents_eviction() {
        let svc = service();
        svc.table
            .create(
                1,
                &ServerDef::default(),
                Duration::from_millis(60),
                Arc::new(CpuExecutor),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        svc.keep_alive(1).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(sweep_once(&svc.table), 0);
        svc.keep_alive(1).unwrap();
    }

    #[tokio::test]
    async fn test_requests_to_master_context() {
        let svc = service();
        let send = QueueItem::SendTensor {
            op_id: 1,
            tensors: vec![two_by_two()],
            device: DEVICE.to_string(),
        };

        // No context yet: identified NotFound.
        let err = svc
            .enqueue(&EnqueueRequest {
                context_id: 1,
                queue: vec![send.clone()],
            })
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("unable to find a context_id matching the specified one"));

        // After registering the master environment the same request works.
        let env =
            Arc::new(ExecutionEnv::new(&ServerDef::default(), Arc::new(CpuExecutor)).unwrap());
        svc.create_master_context(1, env).unwrap();
        svc.enqueue(&EnqueueRequest {
            context_id: 1,
            queue: vec![send],
        })
        .await
        .unwrap();

        // Masters survive sweeps and go away only on explicit close.
        assert_eq!(sweep_once(&svc.table), 0);
        svc.close_context(1).unwrap();
        assert!(svc.keep_alive(1).is_err());
    }

    #[tokio::test]
    async fn test_send_tensor_then_matmul() {
        let svc = service();
        svc.create_context(&create_req(1)).unwrap();

        svc.enqueue(&EnqueueRequest {
            context_id: 1,
            queue: vec![
                QueueItem::SendTensor {
                    op_id: 1,
                    tensors: vec![two_by_two()],
                    device: DEVICE.to_string(),
                },
                matmul_op(2, 1),
            ],
        })
        .await
        .unwrap();

        let result = svc.tensor_handle(1, 2, 0).unwrap();
        assert_eq!(result.data, vec![7.0, 10.0, 15.0, 22.0]);
    }

    #[tokio::test]
    async fn test_wait_queue_done_drains() {
        let svc = service();
        svc.create_context(&create_req(1)).unwrap();
        svc.enqueue(&EnqueueRequest {
            context_id: 1,
            queue: vec![const_op(1)],
        })
        .await
        .unwrap();

        svc.wait_queue_done(1).await.unwrap();
        assert!(svc.wait_queue_done(2).await.is_err());
    }

    #[tokio::test]
    async fn test_close_releases_handle_store() {
        let svc = service();
        svc.create_context(&create_req(1)).unwrap();
        svc.enqueue(&EnqueueRequest {
            context_id: 1,
            queue: vec![const_op(1)],
        })
        .await
        .unwrap();

        // Hold a reference across close, the way an in-flight request
        // would; the store is cleared but the context object survives
        // until the holder drops it.
        let held = svc.table.lookup(1).unwrap();
        svc.close_context(1).unwrap();
        assert!(held.handles().is_empty());
        assert!(matches!(
            svc.close_context(1).unwrap_err(),
            Error::ContextNotFound(1)
        ));
    }
}
