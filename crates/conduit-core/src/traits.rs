use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::protocol::{AgentCard, MessageSendParams, StreamResponse};

/// Stream of responses from one `message/stream` call.
pub type ResponseStream<'a> = BoxStream<'a, Result<StreamResponse>>;

/// Agent discovery: maps a workflow node to the remote agent that runs it.
pub trait AgentResolver: Send + Sync + 'static {
    /// Card of the planner agent (fixed resource lookup).
    fn planner_card(&self) -> BoxFuture<'_, Result<AgentCard>>;

    /// Card of the agent best suited to a free-text task.
    fn find_agent<'a>(&'a self, task: &'a str) -> BoxFuture<'a, Result<AgentCard>>;
}

/// Remote-agent transport: streaming send of one message.
pub trait AgentTransport: Send + Sync + 'static {
    /// Send `params` to the agent behind `card` and stream its responses.
    fn send_message_stream<'a>(
        &'a self,
        card: &AgentCard,
        params: MessageSendParams,
    ) -> BoxFuture<'a, Result<ResponseStream<'a>>>;
}
