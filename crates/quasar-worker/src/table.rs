use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quasar_common::{Error, ServerDef};

use crate::context::ServerContext;
use crate::engine::{ExecutionEnv, OpExecutor};

/// Keep-alive applied when a create request leaves it unspecified.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 600;

/// Concurrent registry of server contexts keyed by context id.
///
/// The mapping itself is the single point of mutual exclusion for
/// existence, creation and removal; per-context state is independently
/// guarded, so batches on different contexts never contend here beyond
/// the map operation.
#[derive(Default)]
pub struct ContextTable {
    contexts: Mutex<HashMap<u64, Arc<ServerContext>>>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a fresh execution environment to `context_id`. Rejects a
    /// duplicate or retried create on a live id; the caller must close
    /// first if re-creation is intended.
    pub fn create(
        &self,
        context_id: u64,
        server_def: &ServerDef,
        keep_alive: Duration,
        executor: Arc<dyn OpExecutor>,
    ) -> Result<Arc<ServerContext>, Error> {
        let env = Arc::new(ExecutionEnv::new(server_def, executor)?);
        self.insert(Arc::new(ServerContext::new(context_id, env, keep_alive)))
    }

    /// Bind a pre-existing, externally owned environment. Used when this
    /// process is itself the originating caller; the resulting context
    /// is excluded from idle eviction.
    pub fn register_master(
        &self,
        context_id: u64,
        env: Arc<ExecutionEnv>,
    ) -> Result<Arc<ServerContext>, Error> {
        let keep_alive = Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS);
        self.insert(Arc::new(ServerContext::master(context_id, env, keep_alive)))
    }

    fn insert(&self, ctx: Arc<ServerContext>) -> Result<Arc<ServerContext>, Error> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        let context_id = ctx.context_id();
        if contexts.contains_key(&context_id) {
            return Err(Error::ContextAlreadyExists(context_id));
        }
        contexts.insert(context_id, ctx.clone());
        tracing::info!(context_id, is_master = ctx.is_master(), "context created");
        Ok(ctx)
    }

    /// Acquire an owned reference to a live context. The reference keeps
    /// the context alive for the holder's scope even if it is removed
    /// from the table concurrently.
    pub fn lookup(&self, context_id: u64) -> Result<Arc<ServerContext>, Error> {
        let contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts
            .get(&context_id)
            .cloned()
            .ok_or(Error::ContextNotFound(context_id))
    }

    /// Replace the device configuration of an existing context without
    /// touching its id, queue state or registered functions.
    pub fn update(&self, context_id: u64, server_def: &ServerDef) -> Result<(), Error> {
        let ctx = self.lookup(context_id)?;
        ctx.env().update_devices(server_def)?;
        ctx.touch();
        Ok(())
    }

    /// Atomically detach the entry. The context stays alive until every
    /// outstanding reference is released.
    pub fn remove(&self, context_id: u64) -> Result<Arc<ServerContext>, Error> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts
            .remove(&context_id)
            .ok_or(Error::ContextNotFound(context_id))
    }

    /// Snapshot of live contexts for the reaper sweep.
    pub fn snapshot(&self) -> Vec<Arc<ServerContext>> {
        let contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contexts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
