use thiserror::Error;

/// Error taxonomy shared by the worker service and the cluster layer.
///
/// Idle eviction is an expected lifecycle event: operations against an
/// evicted context id return the same `ContextNotFound` as a never-created
/// one, and no variant here is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to find a context_id matching the specified one ({0})")]
    ContextNotFound(u64),

    #[error("context_id {0} already exists")]
    ContextAlreadyExists(u64),

    #[error("function '{0}' is already registered with a different definition")]
    FunctionAlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no tensor handle for op_id {op_id}, output {output_index}")]
    HandleNotFound { op_id: u64, output_index: u32 },

    #[error("execution failed: {0}")]
    Execution(String),

    /// Batch execution halted: `index` identifies the failing queue item.
    #[error("queue item {index} failed: {source}")]
    QueueItem {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ContextNotFound(_) | Error::HandleNotFound { .. }
        )
    }

    /// The failing item position for batch errors.
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            Error::QueueItem { index, .. } => Some(*index),
            _ => None,
        }
    }
}
