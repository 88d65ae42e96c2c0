use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::engine::ExecutionEnv;
use crate::handle_store::RemoteHandleStore;
use crate::util::now_ms;

/// One live session: an execution environment bound to a context id,
/// with its handle store, idle-eviction bookkeeping and the per-context
/// queue lock.
///
/// Handed out as `Arc<ServerContext>`: a lookup clones the Arc and the
/// holder releases it by dropping. Teardown happens only after the table
/// entry is removed and every outstanding holder has dropped its clone,
/// so the reaper can never free a context out from under a request.
pub struct ServerContext {
    context_id: u64,
    env: Arc<ExecutionEnv>,
    handles: RemoteHandleStore,
    last_access_ms: AtomicU64,
    keep_alive: Duration,
    is_master: bool,
    /// Serializes batches on this context; FIFO between batches, no
    /// contention with other contexts.
    queue_lock: Mutex<()>,
}

impl ServerContext {
    pub fn new(context_id: u64, env: Arc<ExecutionEnv>, keep_alive: Duration) -> Self {
        Self::with_master_flag(context_id, env, keep_alive, false)
    }

    /// A master context wraps the originating caller's own environment
    /// and is exempt from idle eviction.
    pub fn master(context_id: u64, env: Arc<ExecutionEnv>, keep_alive: Duration) -> Self {
        Self::with_master_flag(context_id, env, keep_alive, true)
    }

    fn with_master_flag(
        context_id: u64,
        env: Arc<ExecutionEnv>,
        keep_alive: Duration,
        is_master: bool,
    ) -> Self {
        Self {
            context_id,
            env,
            handles: RemoteHandleStore::default(),
            last_access_ms: AtomicU64::new(now_ms()),
            keep_alive,
            is_master,
            queue_lock: Mutex::new(()),
        }
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn env(&self) -> &ExecutionEnv {
        &self.env
    }

    pub fn handles(&self) -> &RemoteHandleStore {
        &self.handles
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub(crate) fn queue_lock(&self) -> &Mutex<()> {
        &self.queue_lock
    }

    /// Refresh the last-access timestamp. Every successful request on
    /// the context counts as liveness.
    pub fn touch(&self) {
        self.last_access_ms.store(now_ms(), Ordering::Relaxed);
    }

    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    /// True when the keep-alive deadline has elapsed. Master contexts
    /// never expire; they are closed explicitly by their owner.
    pub fn idle_deadline_exceeded(&self, now_ms: u64) -> bool {
        if self.is_master {
            return false;
        }
        let idle = now_ms.saturating_sub(self.last_access_ms());
        idle > self.keep_alive.as_millis() as u64
    }
}

impl Drop for ServerContext {
    fn drop(&mut self) {
        tracing::debug!(context_id = self.context_id, "tearing down server context");
        self.handles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CpuExecutor;
    use quasar_common::ServerDef;

    fn make_context(keep_alive: Duration, is_master: bool) -> ServerContext {
        let env = Arc::new(ExecutionEnv::new(&ServerDef::default(), Arc::new(CpuExecutor)).unwrap());
        if is_master {
            ServerContext::master(1, env, keep_alive)
        } else {
            ServerContext::new(1, env, keep_alive)
        }
    }

    #[test]
    fn test_idle_deadline() {
        let ctx = make_context(Duration::from_millis(100), false);
        let created = ctx.last_access_ms();
        assert!(!ctx.idle_deadline_exceeded(created + 50));
        assert!(ctx.idle_deadline_exceeded(created + 150));
    }

    #[test]
    fn test_touch_resets_deadline() {
        let ctx = make_context(Duration::from_millis(100), false);
        let created = ctx.last_access_ms();
        ctx.touch();
        assert!(ctx.last_access_ms() >= created);
        assert!(!ctx.idle_deadline_exceeded(ctx.last_access_ms() + 50));
    }

    #[test]
    fn test_master_never_expires() {
        let ctx = make_context(Duration::from_millis(1), true);
        assert!(!ctx.idle_deadline_exceeded(ctx.last_access_ms() + 1_000_000));
    }
}
