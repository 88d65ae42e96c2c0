pub mod context;
pub mod engine;
pub mod executor;
pub mod handle_store;
pub mod reaper;
pub mod service;
pub mod table;
pub mod util;

pub use context::ServerContext;
pub use engine::{CpuExecutor, ExecutionEnv, FunctionRegistry, OpExecutor};
pub use handle_store::{RemoteHandleStore, StoredHandle};
pub use service::WorkerService;
pub use table::ContextTable;
