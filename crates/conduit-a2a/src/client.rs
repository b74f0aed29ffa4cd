//! A2A client: JSON-RPC over HTTP, with SSE for `message/stream`.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use conduit_core::config::ClientConfig;
use conduit_core::error::{ConduitError, Result};
use conduit_core::protocol::{
    methods, AgentCard, JsonRpcRequest, JsonRpcResponse, MessageSendParams, StreamResponse, Task,
    TaskIdParams, TaskQueryParams,
};
use conduit_core::traits::{AgentTransport, ResponseStream};

use crate::streaming::SseStream;

const AGENT_CARD_PATH: &str = ".well-known/agent.json";

/// A2A client for communicating with remote agents.
#[derive(Clone)]
pub struct A2aClient {
    http: Client,
    timeout: Duration,
    token: Option<String>,
}

impl A2aClient {
    /// Build a client. `timeout` bounds unary calls; streams are bounded only
    /// by the connect timeout, since a remote task may run for a long time.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConduitError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            timeout,
            token: None,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Duration::from_secs(config.timeout_secs))?.with_token(config.token.clone()))
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// Fetch an agent's card from `<base_url>/.well-known/agent.json`.
    pub async fn fetch_agent_card(&self, base_url: &str) -> Result<AgentCard> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), AGENT_CARD_PATH);
        debug!(url = %url, "Fetching agent card");

        let req = self.authorize(self.http.get(&url).timeout(self.timeout));
        let resp = req
            .send()
            .await
            .map_err(|e| ConduitError::Transport(format!("failed to connect to {}: {}", url, e)))?;
        let resp = check_status(resp).await?;

        let card: AgentCard = resp
            .json()
            .await
            .map_err(|e| ConduitError::Transport(format!("failed to parse agent card: {}", e)))?;

        info!(agent = %card.name, skills = card.skills.len(), "Fetched agent card");
        Ok(card)
    }

    /// `message/send`. Returns the resulting task or a direct message.
    pub async fn send_message(&self, url: &str, params: MessageSendParams) -> Result<StreamResponse> {
        self.call(url, methods::MESSAGE_SEND, params).await
    }

    /// `tasks/get`
    pub async fn get_task(&self, url: &str, task_id: &str, history_length: Option<u32>) -> Result<Task> {
        let params = TaskQueryParams {
            id: task_id.to_string(),
            history_length,
        };
        self.call(url, methods::TASKS_GET, params).await
    }

    /// `tasks/cancel`
    pub async fn cancel_task(&self, url: &str, task_id: &str) -> Result<Task> {
        let params = TaskIdParams {
            id: task_id.to_string(),
        };
        let task: Task = self.call(url, methods::TASKS_CANCEL, params).await?;
        info!(task_id = %task_id, state = %task.status.state, "Task cancel requested");
        Ok(task)
    }

    /// `message/stream`. Each SSE `data:` payload is one JSON-RPC response.
    pub async fn send_message_streaming(
        &self,
        url: &str,
        params: MessageSendParams,
    ) -> Result<ResponseStream<'static>> {
        let request = JsonRpcRequest::new(methods::MESSAGE_STREAM, params)?;
        debug!(url = %url, "Opening message stream");

        let req = self
            .authorize(self.http.post(url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request);
        let resp = req
            .send()
            .await
            .map_err(|e| ConduitError::Transport(format!("failed to reach {}: {}", url, e)))?;
        let resp = check_status(resp).await?;

        let stream = SseStream::new(resp.bytes_stream()).map(|event| {
            let event = event?;
            let rpc: JsonRpcResponse = serde_json::from_str(&event.data)?;
            rpc.into_result::<StreamResponse>()
        });
        Ok(stream.boxed())
    }

    async fn call<P, T>(&self, url: &str, method: &str, params: P) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest::new(method, params)?;
        debug!(url = %url, method = %method, "Sending JSON-RPC request");

        let req = self
            .authorize(self.http.post(url).timeout(self.timeout))
            .json(&request);
        let resp = req
            .send()
            .await
            .map_err(|e| ConduitError::Transport(format!("failed to reach {}: {}", url, e)))?;
        let resp = check_status(resp).await?;

        let rpc: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| ConduitError::Transport(format!("invalid JSON-RPC response: {}", e)))?;
        rpc.into_result()
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ConduitError::Http {
        status: status.as_u16(),
        message,
    })
}

impl AgentTransport for A2aClient {
    fn send_message_stream<'a>(
        &'a self,
        card: &AgentCard,
        params: MessageSendParams,
    ) -> BoxFuture<'a, Result<ResponseStream<'a>>> {
        let url = card.url.clone();
        Box::pin(async move { self.send_message_streaming(&url, params).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::protocol::Message;

    fn client() -> A2aClient {
        A2aClient::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_from_config_carries_token() {
        let config = ClientConfig {
            timeout_secs: 5,
            token: Some("secret".into()),
        };
        let client = A2aClient::from_config(&config).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(5));
        assert_eq!(client.token.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_fetch_agent_card_connection_refused() {
        let result = client().fetch_agent_card("http://127.0.0.1:1/").await;
        match result {
            Err(ConduitError::Transport(msg)) => {
                assert!(msg.contains("http://127.0.0.1:1/.well-known/agent.json"))
            }
            other => panic!("unexpected: {:?}", other.map(|c| c.name)),
        }
    }

    #[tokio::test]
    async fn test_stream_connection_refused() {
        let params = MessageSendParams::new(Message::user_text("hello"));
        let result = client()
            .send_message_streaming("http://127.0.0.1:1/", params)
            .await;
        assert!(matches!(result, Err(ConduitError::Transport(_))));
    }

    #[tokio::test]
    async fn test_get_task_connection_refused() {
        let result = client().get_task("http://127.0.0.1:1/", "task-123", None).await;
        assert!(result.is_err());
    }
}
