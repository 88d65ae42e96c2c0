use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::table::ContextTable;
use crate::util::now_ms;

/// Evict every non-master context whose keep-alive deadline has elapsed.
/// Returns the number of contexts removed. Eviction detaches the table
/// entry; final teardown happens when outstanding holders drop their
/// references.
pub fn sweep_once(table: &ContextTable) -> usize {
    let now = now_ms();
    let mut evicted = 0;
    for ctx in table.snapshot() {
        if !ctx.idle_deadline_exceeded(now) {
            continue;
        }
        // The context may have been refreshed or closed since the
        // snapshot; only count an actual removal.
        if table.remove(ctx.context_id()).is_ok() {
            tracing::info!(
                context_id = ctx.context_id(),
                idle_ms = now.saturating_sub(ctx.last_access_ms()),
                keep_alive_ms = ctx.keep_alive().as_millis() as u64,
                "evicting idle context"
            );
            evicted += 1;
        }
    }
    evicted
}

/// Background eviction loop, independent of request traffic. Runs until
/// the returned handle is aborted.
pub fn spawn(table: Arc<ContextTable>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            sweep_once(&table);
        }
    })
}
