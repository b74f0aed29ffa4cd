use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conduit_core::error::ConduitError;
use conduit_core::protocol::{
    methods, AgentCard, JsonRpcError, JsonRpcRequest, JsonRpcResponse, MessageSendParams, RequestId,
};

use crate::middleware::Authenticated;
use crate::projection::TaskProjection;
use crate::state::AppState;

// GET /health (public)
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "paused_sessions": state.orchestrator.session_count().await,
    }))
}

// GET /.well-known/agent.json (public)
pub async fn agent_card(State(state): State<Arc<AppState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

// POST / JSON-RPC, requires auth
pub async fn rpc(
    Authenticated(auth_result): Authenticated,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return rpc_error(None, JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string())),
    };
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => return rpc_error(None, JsonRpcError::new(JsonRpcError::INVALID_REQUEST, e.to_string())),
    };
    debug!(caller = %auth_result.name, method = %request.method, "JSON-RPC request");

    match request.method.as_str() {
        methods::MESSAGE_STREAM | methods::MESSAGE_SEND => {
            let params: MessageSendParams = match serde_json::from_value(request.params) {
                Ok(p) => p,
                Err(e) => {
                    return rpc_error(request.id, JsonRpcError::new(JsonRpcError::INVALID_PARAMS, e.to_string()))
                }
            };
            if request.method == methods::MESSAGE_STREAM {
                message_stream(state, request.id, params).into_response()
            } else {
                message_send(state, request.id, params).await
            }
        }
        other => rpc_error(request.id, JsonRpcError::method_not_found(other)),
    }
}

/// Orchestrator ids for a request: the caller's context/task when given.
fn projection_for(params: &MessageSendParams) -> TaskProjection {
    let context_id = params
        .message
        .context_id
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let task_id = params
        .message
        .task_id
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    TaskProjection::new(task_id, context_id)
}

fn message_stream(
    state: Arc<AppState>,
    id: Option<RequestId>,
    params: MessageSendParams,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let mut projection = projection_for(&params);
    let query = params.message.text();

    tokio::spawn(async move {
        let context_id = projection.context_id().to_string();
        info!(context_id = %context_id, "Streaming orchestrator response");
        let _ = tx.send(to_rpc(&id, &projection.snapshot()));

        let result = state
            .orchestrator
            .stream(&query, &context_id, |chunk| {
                let _ = tx.send(to_rpc(&id, &projection.observe(chunk)));
            })
            .await;

        let last = match result {
            Ok(graph_state) => to_rpc(&id, &projection.finish(graph_state)),
            Err(ConduitError::EmptyQuery) => {
                JsonRpcResponse::failure(id.clone(), error_for(&ConduitError::EmptyQuery))
            }
            Err(e) => {
                warn!(context_id = %context_id, error = %e, "Orchestrator stream failed");
                to_rpc(&id, &projection.fail(&e.to_string()))
            }
        };
        let _ = tx.send(last);
    });

    let events = UnboundedReceiverStream::new(rx).filter_map(|response| async move {
        match serde_json::to_string(&response) {
            Ok(data) => Some(Ok::<_, Infallible>(Event::default().data(data))),
            Err(e) => {
                warn!(error = %e, "Dropping unserializable SSE event");
                None
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn message_send(state: Arc<AppState>, id: Option<RequestId>, params: MessageSendParams) -> Response {
    let mut projection = projection_for(&params);
    let query = params.message.text();
    let context_id = projection.context_id().to_string();

    let result = state
        .orchestrator
        .stream(&query, &context_id, |chunk| {
            projection.observe(chunk);
        })
        .await;

    match result {
        Ok(graph_state) => {
            projection.finish(graph_state);
            Json(to_rpc(&id, &projection.task())).into_response()
        }
        Err(ConduitError::EmptyQuery) => rpc_error(id, error_for(&ConduitError::EmptyQuery)),
        Err(e) => {
            warn!(context_id = %context_id, error = %e, "Orchestrator run failed");
            projection.fail(&e.to_string());
            Json(to_rpc(&id, &projection.task())).into_response()
        }
    }
}

fn to_rpc(id: &Option<RequestId>, result: &impl serde::Serialize) -> JsonRpcResponse {
    JsonRpcResponse::success(id.clone(), result).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode JSON-RPC result");
        JsonRpcResponse::failure(
            id.clone(),
            JsonRpcError::new(JsonRpcError::INTERNAL_ERROR, e.to_string()),
        )
    })
}

fn error_for(error: &ConduitError) -> JsonRpcError {
    let code = match error {
        ConduitError::EmptyQuery => JsonRpcError::INVALID_PARAMS,
        _ => JsonRpcError::INTERNAL_ERROR,
    };
    JsonRpcError::new(code, error.to_string())
}

fn rpc_error(id: Option<RequestId>, error: JsonRpcError) -> Response {
    Json(JsonRpcResponse::failure(id, error)).into_response()
}
