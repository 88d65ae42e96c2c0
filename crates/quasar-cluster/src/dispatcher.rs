use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use quasar_common::{
    DeviceName, EnqueueRequest, Error, FunctionDef, Operation, OperationInput, QueueItem,
};

use crate::client::ClientResolver;

/// One instantiated multi-device function: where it runs and whether the
/// target lives in another process.
#[derive(Debug, Clone)]
pub struct InstantiatedFunction {
    pub context_id: u64,
    pub name: String,
    pub target_device: DeviceName,
    pub is_cross_process: bool,
}

/// Routes sub-invocations of multi-device functions to the worker that
/// owns the target device. Inputs living on another process travel as
/// remote handle references, never as copies; the receiving worker
/// resolves them against its own handle store.
pub struct ClusterFunctionDispatcher {
    local_worker: String,
    resolver: Arc<dyn ClientResolver>,
    next_handle: AtomicU64,
    handles: DashMap<u64, InstantiatedFunction>,
}

impl ClusterFunctionDispatcher {
    pub fn new(local_worker: impl Into<String>, resolver: Arc<dyn ClientResolver>) -> Self {
        Self {
            local_worker: local_worker.into(),
            resolver,
            next_handle: AtomicU64::new(1),
            handles: DashMap::new(),
        }
    }

    /// Register `function` on the worker owning `target_device` and
    /// return a handle for later invocations. Registration is idempotent
    /// for identical definitions, so re-instantiation is safe.
    pub async fn instantiate(
        &self,
        context_id: u64,
        function: FunctionDef,
        target_device: &str,
    ) -> Result<u64, Error> {
        let device: DeviceName = target_device.parse()?;
        let worker = device.worker_name();
        let client = self.resolver.client_for(&worker)?;

        client
            .enqueue(EnqueueRequest {
                context_id,
                queue: vec![QueueItem::RegisterFunction {
                    function: function.clone(),
                }],
            })
            .await?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let is_cross_process = worker != self.local_worker;
        tracing::debug!(
            context_id,
            function = %function.name,
            target = %device,
            is_cross_process,
            "instantiated cluster function"
        );
        self.handles.insert(
            handle,
            InstantiatedFunction {
                context_id,
                name: function.name,
                target_device: device,
                is_cross_process,
            },
        );
        Ok(handle)
    }

    /// Whether the instantiated function crosses a process boundary,
    /// so callers can special-case cleanup and teardown.
    pub fn is_cross_process(&self, handle: u64) -> Result<bool, Error> {
        self.lookup(handle).map(|f| f.is_cross_process)
    }

    /// Invoke the function on its target worker as a single-operation
    /// batch; the result is published under `op_id` in the target's
    /// handle store. Returns the output shapes.
    pub async fn run(
        &self,
        handle: u64,
        op_id: u64,
        inputs: Vec<OperationInput>,
    ) -> Result<Vec<Vec<usize>>, Error> {
        let func = self.lookup(handle)?;
        let client = self.resolver.client_for(&func.target_device.worker_name())?;

        let response = client
            .enqueue(EnqueueRequest {
                context_id: func.context_id,
                queue: vec![QueueItem::Operation(Operation {
                    id: op_id,
                    name: func.name.clone(),
                    device: func.target_device.to_string(),
                    attrs: vec![],
                    inputs,
                })],
            })
            .await?;

        Ok(response
            .responses
            .into_iter()
            .next()
            .map(|r| r.shapes)
            .unwrap_or_default())
    }

    /// Release the resources a prior invocation left on the target
    /// worker, then forget the handle.
    pub async fn cleanup(&self, handle: u64, op_id: u64) -> Result<(), Error> {
        let func = self.lookup(handle)?;
        let client = self.resolver.client_for(&func.target_device.worker_name())?;
        client
            .enqueue(EnqueueRequest {
                context_id: func.context_id,
                queue: vec![QueueItem::CleanupFunction { op_id }],
            })
            .await?;
        self.handles.remove(&handle);
        Ok(())
    }

    fn lookup(&self, handle: u64) -> Result<InstantiatedFunction, Error> {
        self.handles
            .get(&handle)
            .map(|f| f.clone())
            .ok_or_else(|| Error::InvalidArgument(format!("unknown function handle {}", handle)))
    }
}
