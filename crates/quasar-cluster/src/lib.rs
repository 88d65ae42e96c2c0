pub mod client;
pub mod dispatcher;
pub mod http;
pub mod local;

pub use client::{ClientResolver, StaticResolver, WorkerClient};
pub use dispatcher::{ClusterFunctionDispatcher, InstantiatedFunction};
pub use http::HttpWorkerClient;
pub use local::InProcessClient;
