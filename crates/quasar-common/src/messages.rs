use serde::{Deserialize, Serialize};

use crate::attr::AttrValue;
use crate::function::FunctionDef;
use crate::tensor::Tensor;

/// Static description of the cluster as seen by one worker: its own
/// job/task identity plus the devices it should know about (local and
/// remote). UpdateContext replaces the device set, e.g. when new workers
/// join.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerDef {
    pub job_name: String,
    pub task_index: u32,
    #[serde(default)]
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateContextRequest {
    pub context_id: u64,
    pub server_def: ServerDef,
    /// Idle eviction deadline in seconds; 0 means the server default.
    #[serde(default)]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateContextRequest {
    pub context_id: u64,
    pub server_def: ServerDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeepAliveRequest {
    pub context_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseContextRequest {
    pub context_id: u64,
}

/// Names one output slot of a previously enqueued operation. Cheap to
/// pass across process boundaries; the consuming worker resolves it
/// against its own handle store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTensorHandle {
    pub op_id: u64,
    pub output_index: u32,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OperationInput {
    /// Inline tensor value.
    Value(Tensor),
    /// Reference to a prior operation's output.
    Remote(RemoteTensorHandle),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Caller-assigned id, unique within the context; later items refer
    /// to this operation's outputs by (id, output_index).
    pub id: u64,
    pub name: String,
    pub device: String,
    #[serde(default)]
    pub attrs: Vec<(String, AttrValue)>,
    #[serde(default)]
    pub inputs: Vec<OperationInput>,
}

/// One entry of an enqueue batch. A closed union dispatched by a single
/// match in the queue executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueItem {
    Operation(Operation),
    RegisterFunction {
        function: FunctionDef,
    },
    /// Materialize inline tensors under `op_id` as if produced by a
    /// zero-input operation.
    SendTensor {
        op_id: u64,
        tensors: Vec<Tensor>,
        device: String,
    },
    /// Release handle-store entries retained for a function invocation.
    CleanupFunction {
        op_id: u64,
    },
    /// Block until all previously enqueued work on the context has
    /// completed.
    SyncRemoteExecutor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub context_id: u64,
    pub queue: Vec<QueueItem>,
}

/// Per-item result: output shapes for Operation/SendTensor items, empty
/// for housekeeping items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueItemResponse {
    #[serde(default)]
    pub shapes: Vec<Vec<usize>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub responses: Vec<QueueItemResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_item_json_roundtrip() {
        let item = QueueItem::Operation(Operation {
            id: 2,
            name: "MatMul".to_string(),
            device: "/job:localhost/task:0/device:CPU:0".to_string(),
            attrs: vec![("transpose_a".to_string(), AttrValue::Bool(false))],
            inputs: vec![OperationInput::Remote(RemoteTensorHandle {
                op_id: 1,
                output_index: 0,
                device: "/job:localhost/task:0/device:CPU:0".to_string(),
            })],
        });
        let json = serde_json::to_string(&item).unwrap();
        let back: QueueItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_sync_item_tag() {
        let json = serde_json::to_value(QueueItem::SyncRemoteExecutor).unwrap();
        assert_eq!(json["kind"], "sync_remote_executor");
    }
}
