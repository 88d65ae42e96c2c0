pub mod attr;
pub mod device;
pub mod error;
pub mod function;
pub mod messages;
pub mod telemetry;
pub mod tensor;

pub use attr::AttrValue;
pub use device::DeviceName;
pub use error::Error;
pub use function::{FunctionDef, FunctionNode};
pub use messages::{
    CloseContextRequest, CreateContextRequest, EnqueueRequest, EnqueueResponse, KeepAliveRequest,
    Operation, OperationInput, QueueItem, QueueItemResponse, RemoteTensorHandle, ServerDef,
    UpdateContextRequest,
};
pub use tensor::Tensor;
