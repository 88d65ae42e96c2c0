use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use quasar_common::{
    CreateContextRequest, EnqueueRequest, Error, UpdateContextRequest,
};

use crate::state::AppState;

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::ContextNotFound(_) | Error::HandleNotFound { .. } => StatusCode::NOT_FOUND,
        Error::ContextAlreadyExists(_) | Error::FunctionAlreadyExists(_) => StatusCode::CONFLICT,
        Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Execution(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::QueueItem { source, .. } => match source.as_ref() {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        },
    };
    let body = json!({
        "error": {
            "message": err.to_string(),
            "failed_index": err.failed_index(),
        }
    });
    (status, Json(body)).into_response()
}

pub async fn healthz(State(st): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({"status": "ok", "worker": st.worker_name})),
    )
}

pub async fn create_context(
    State(st): State<AppState>,
    Json(req): Json<CreateContextRequest>,
) -> Response {
    match st.service.create_context(&req) {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn update_context(
    State(st): State<AppState>,
    Path(context_id): Path<u64>,
    Json(req): Json<UpdateContextRequest>,
) -> Response {
    if req.context_id != context_id {
        return error_response(Error::InvalidArgument(format!(
            "context_id mismatch: path {} vs body {}",
            context_id, req.context_id
        )));
    }
    match st.service.update_context(&req) {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn enqueue(
    State(st): State<AppState>,
    Path(context_id): Path<u64>,
    Json(req): Json<EnqueueRequest>,
) -> Response {
    if req.context_id != context_id {
        return error_response(Error::InvalidArgument(format!(
            "context_id mismatch: path {} vs body {}",
            context_id, req.context_id
        )));
    }
    match st.service.enqueue(&req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn wait_queue_done(
    State(st): State<AppState>,
    Path(context_id): Path<u64>,
) -> Response {
    match st.service.wait_queue_done(context_id).await {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn keep_alive(State(st): State<AppState>, Path(context_id): Path<u64>) -> Response {
    match st.service.keep_alive(context_id) {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn close_context(State(st): State<AppState>, Path(context_id): Path<u64>) -> Response {
    match st.service.close_context(context_id) {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))).into_response(),
        Err(err) => error_response(err),
    }
}
