use dashmap::DashMap;

use quasar_common::{Error, Tensor};

/// One materialized value: the tensor plus the device it lives on.
#[derive(Debug, Clone)]
pub struct StoredHandle {
    pub tensor: Tensor,
    pub device: String,
}

/// Maps (producing op id, output index) to locally materialized values.
///
/// Entries appear when an Operation or SendTensor item completes and are
/// read by later items (local, or forwarded from other workers as remote
/// handle references). An op id is never visible before its producer has
/// finished. Lifetime is tied to the owning server context.
#[derive(Debug, Default)]
pub struct RemoteHandleStore {
    entries: DashMap<(u64, u32), StoredHandle>,
}

impl RemoteHandleStore {
    pub fn put(&self, op_id: u64, output_index: u32, tensor: Tensor, device: String) {
        self.entries
            .insert((op_id, output_index), StoredHandle { tensor, device });
    }

    pub fn get(&self, op_id: u64, output_index: u32) -> Result<StoredHandle, Error> {
        self.entries
            .get(&(op_id, output_index))
            .map(|e| e.clone())
            .ok_or(Error::HandleNotFound {
                op_id,
                output_index,
            })
    }

    /// Remove all output slots of one operation.
    pub fn remove_op(&self, op_id: u64) {
        self.entries.retain(|(id, _), _| *id != op_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
