use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use conduit_core::config::GatewayConfig;
use conduit_core::protocol::AgentCard;
use conduit_workflow::OrchestratorAgent;

use crate::routes;
use crate::state::AppState;

/// A2A server exposing the orchestrator, built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    card: AgentCard,
    orchestrator: Arc<OrchestratorAgent>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, card: AgentCard, orchestrator: Arc<OrchestratorAgent>) -> Self {
        Self {
            config,
            card,
            orchestrator,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            card: self.card.clone(),
            orchestrator: self.orchestrator.clone(),
        });

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, agent = %self.card.name, "Gateway listening");

        axum::serve(listener, router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // A2A discovery
        .route("/.well-known/agent.json", get(routes::agent_card))
        .route("/health", get(routes::health))
        // JSON-RPC
        .route("/", post(routes::rpc))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use conduit_core::config::OrchestratorConfig;
    use conduit_test_utils::{completed, input_required, text_artifact, ScriptedResolver, ScriptedTransport};

    fn app(token: Option<&str>, transport: Arc<ScriptedTransport>) -> Router {
        let orchestrator = OrchestratorAgent::new(Arc::new(ScriptedResolver::new()), transport);
        router(Arc::new(AppState {
            config: GatewayConfig {
                token: token.map(str::to_string),
                ..Default::default()
            },
            card: OrchestratorConfig::default().agent_card(),
            orchestrator: Arc::new(orchestrator),
        }))
    }

    fn rpc_request(method: &str, text: &str, context_id: &str) -> Request<Body> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{"kind": "text", "text": text}],
                    "messageId": "m-1",
                    "contextId": context_id,
                }
            }
        });
        Request::post("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_public_routes_skip_auth() {
        let app = app(Some("secret"), Arc::new(ScriptedTransport::new()));

        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/.well-known/agent.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let card = body_json(resp).await;
        assert_eq!(card["name"], "Orchestrator Agent");
        assert_eq!(card["capabilities"]["streaming"], true);
    }

    #[tokio::test]
    async fn test_rpc_requires_bearer() {
        let app = app(Some("secret"), Arc::new(ScriptedTransport::new()));
        let resp = app
            .clone()
            .oneshot(rpc_request("tasks/get", "x", "ctx"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut req = rpc_request("tasks/get", "x", "ctx");
        req.headers_mut()
            .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        // Authenticated, but the method is not served
        assert_eq!(body_json(resp).await["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn test_rpc_parse_error() {
        let app = app(None, Arc::new(ScriptedTransport::new()));
        let req = Request::post("/").body(Body::from("{not json")).unwrap();
        let json = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(json["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_message_send_returns_task() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "planner",
            vec![text_artifact("rt", "rc", "Itinerary ready"), completed("rt", "rc")],
        );
        let app = app(None, transport);

        let json = body_json(app.oneshot(rpc_request("message/send", "Plan a trip", "ctx-1")).await.unwrap()).await;
        let task = &json["result"];
        assert_eq!(task["kind"], "task");
        assert_eq!(task["contextId"], "ctx-1");
        assert_eq!(task["status"]["state"], "completed");
        assert_eq!(task["artifacts"][0]["parts"][0]["text"], "Itinerary ready");
    }

    #[tokio::test]
    async fn test_message_send_pause_then_resume() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("planner", vec![input_required("rt", "rc", "Where to?")]);
        transport.script("planner", vec![completed("rt", "rc")]);
        let app = app(None, transport.clone());

        let json = body_json(app.clone().oneshot(rpc_request("message/send", "Plan a trip", "ctx-2")).await.unwrap()).await;
        assert_eq!(json["result"]["status"]["state"], "input-required");
        assert_eq!(json["result"]["status"]["message"]["parts"][0]["text"], "Where to?");

        let json = body_json(app.oneshot(rpc_request("message/send", "London", "ctx-2")).await.unwrap()).await;
        assert_eq!(json["result"]["status"]["state"], "completed");
        assert_eq!(transport.sent_to("planner")[1].context_id.as_deref(), Some("rc"));
    }

    #[tokio::test]
    async fn test_message_stream_sse() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script(
            "planner",
            vec![text_artifact("rt", "rc", "Itinerary ready"), completed("rt", "rc")],
        );
        let app = app(None, transport);

        let resp = app.oneshot(rpc_request("message/stream", "Plan a trip", "ctx-3")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<Value> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();

        // snapshot, artifact, sub-agent status, closing status
        assert_eq!(events.len(), 4);
        assert_eq!(events[0]["result"]["kind"], "task");
        assert_eq!(events[1]["result"]["kind"], "artifact-update");
        assert_eq!(events[2]["result"]["final"], false);
        let last = &events[3]["result"];
        assert_eq!(last["final"], true);
        assert_eq!(last["status"]["state"], "completed");
        assert_eq!(last["contextId"], "ctx-3");
    }

    #[tokio::test]
    async fn test_message_stream_reports_failure() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_next("planner", "connection refused");
        let app = app(None, transport);

        let resp = app.oneshot(rpc_request("message/stream", "Plan a trip", "ctx-4")).await.unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<Value> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .map(|d| serde_json::from_str(d).unwrap())
            .collect();

        // snapshot, then a closing failed status on the orchestrator's task
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.get("error").is_none()));
        let last = &events[1]["result"];
        assert_eq!(last["final"], true);
        assert_eq!(last["status"]["state"], "failed");
        assert_eq!(last["contextId"], "ctx-4");
        assert!(last["status"]["message"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_message_stream_empty_query_is_rpc_error() {
        let app = app(None, Arc::new(ScriptedTransport::new()));
        let resp = app.oneshot(rpc_request("message/stream", "  ", "ctx-5")).await.unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let last: Value = text
            .lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .last()
            .map(|d| serde_json::from_str(d).unwrap())
            .unwrap();
        assert_eq!(last["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_message_send_failure_returns_failed_task() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_next("planner", "connection refused");
        let app = app(None, transport);

        let json = body_json(app.oneshot(rpc_request("message/send", "Plan a trip", "ctx-6")).await.unwrap()).await;
        assert!(json.get("error").is_none());
        assert_eq!(json["result"]["kind"], "task");
        assert_eq!(json["result"]["status"]["state"], "failed");
    }

    #[tokio::test]
    async fn test_health_reports_paused_sessions() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.script("planner", vec![input_required("rt", "rc", "Where to?")]);
        let app = app(None, transport);

        app.clone().oneshot(rpc_request("message/send", "Plan a trip", "ctx-7")).await.unwrap();
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["paused_sessions"], 1);
    }
}
