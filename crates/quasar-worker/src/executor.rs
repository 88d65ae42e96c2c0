use quasar_common::{
    DeviceName, Error, Operation, OperationInput, QueueItem, QueueItemResponse, Tensor,
};

use crate::context::ServerContext;

/// Execute an ordered batch of queue items against one context.
///
/// Items run strictly in request order; the first failing item halts the
/// batch and the error names its position. Batches on the same context
/// are serialized FIFO through the context's queue lock; other contexts
/// proceed independently.
pub async fn execute_queue(
    ctx: &ServerContext,
    items: &[QueueItem],
) -> Result<Vec<QueueItemResponse>, Error> {
    let _guard = ctx.queue_lock().lock().await;

    let mut responses = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match run_item(ctx, item).await {
            Ok(response) => responses.push(response),
            Err(source) => {
                tracing::debug!(
                    context_id = ctx.context_id(),
                    index,
                    error = %source,
                    "queue item failed, halting batch"
                );
                return Err(Error::QueueItem {
                    index,
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(responses)
}

async fn run_item(ctx: &ServerContext, item: &QueueItem) -> Result<QueueItemResponse, Error> {
    match item {
        QueueItem::Operation(op) => run_operation(ctx, op).await,
        QueueItem::RegisterFunction { function } => {
            ctx.env().functions().register(function.clone())?;
            Ok(QueueItemResponse::default())
        }
        QueueItem::SendTensor {
            op_id,
            tensors,
            device,
        } => {
            if tensors.is_empty() {
                return Err(Error::InvalidArgument(
                    "send_tensor carries no tensors".to_string(),
                ));
            }
            let shapes = tensors.iter().map(|t| t.shape.clone()).collect();
            for (i, tensor) in tensors.iter().enumerate() {
                ctx.handles()
                    .put(*op_id, i as u32, tensor.clone(), device.clone());
            }
            Ok(QueueItemResponse { shapes })
        }
        QueueItem::CleanupFunction { op_id } => {
            ctx.handles().remove_op(*op_id);
            Ok(QueueItemResponse::default())
        }
        // Batches execute synchronously under the queue lock, so all
        // previously enqueued work has already completed by the time
        // this item is reached.
        QueueItem::SyncRemoteExecutor => Ok(QueueItemResponse::default()),
    }
}

async fn run_operation(ctx: &ServerContext, op: &Operation) -> Result<QueueItemResponse, Error> {
    let device: DeviceName = op.device.parse()?;

    // Resolve all inputs before executing anything, so a failed item
    // leaves the handle store untouched.
    let inputs = op
        .inputs
        .iter()
        .map(|input| resolve_input(ctx, op, input))
        .collect::<Result<Vec<_>, _>>()?;

    let outputs = ctx.env().run_op(&op.name, &device, &op.attrs, inputs).await;
    let outputs = match outputs {
        Ok(outputs) => outputs,
        Err(err @ (Error::InvalidArgument(_) | Error::Execution(_))) => return Err(err),
        Err(err) => return Err(Error::Execution(err.to_string())),
    };

    let shapes = outputs.iter().map(|t| t.shape.clone()).collect();
    for (i, tensor) in outputs.into_iter().enumerate() {
        ctx.handles()
            .put(op.id, i as u32, tensor, op.device.clone());
    }
    Ok(QueueItemResponse { shapes })
}

fn resolve_input(
    ctx: &ServerContext,
    op: &Operation,
    input: &OperationInput,
) -> Result<Tensor, Error> {
    match input {
        OperationInput::Value(tensor) => Ok(tensor.clone()),
        OperationInput::Remote(handle) => ctx
            .handles()
            .get(handle.op_id, handle.output_index)
            .map(|stored| stored.tensor)
            .map_err(|_| {
                // Referencing an op id with no completed producer is a
                // caller contract violation, not a transient miss.
                Error::InvalidArgument(format!(
                    "operation {} references op_id {} output {} which has not been produced",
                    op.id, handle.op_id, handle.output_index
                ))
            }),
    }
}
