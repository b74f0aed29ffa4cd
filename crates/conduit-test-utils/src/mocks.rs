use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::StreamExt;

use conduit_core::error::{ConduitError, Result};
use conduit_core::protocol::{AgentCard, Message, MessageSendParams, StreamResponse};
use conduit_core::traits::{AgentResolver, AgentTransport, ResponseStream};

use crate::fixtures::test_card;

/// Resolver that matches tasks to cards by case-insensitive keyword.
///
/// The first registered keyword contained in the task wins.
pub struct ScriptedResolver {
    planner: AgentCard,
    agents: Vec<(String, AgentCard)>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    /// A resolver whose planner card is named `planner`.
    pub fn new() -> Self {
        Self {
            planner: test_card("planner"),
            agents: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Route tasks containing `keyword` to a card named `agent`.
    pub fn with_agent(mut self, keyword: &str, agent: &str) -> Self {
        self.agents.push((keyword.to_lowercase(), test_card(agent)));
        self
    }

    /// Tasks passed to `find_agent`, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl Default for ScriptedResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentResolver for ScriptedResolver {
    fn planner_card(&self) -> BoxFuture<'_, Result<AgentCard>> {
        Box::pin(async move { Ok(self.planner.clone()) })
    }

    fn find_agent<'a>(&'a self, task: &'a str) -> BoxFuture<'a, Result<AgentCard>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push(task.to_string());
            let lowered = task.to_lowercase();
            self.agents
                .iter()
                .find(|(keyword, _)| lowered.contains(keyword.as_str()))
                .map(|(_, card)| card.clone())
                .ok_or_else(|| ConduitError::AgentNotFound(task.to_string()))
        })
    }
}

enum Reply {
    Stream(Vec<Result<StreamResponse>>),
    Fail(String),
}

/// Transport that replays scripted responses per agent name.
///
/// Each send to an agent consumes that agent's next script. Sending with no
/// script left fails with a transport error.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    sent: Mutex<Vec<(String, Message)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one stream of responses for the next send to `agent`.
    pub fn script(&self, agent: &str, responses: Vec<StreamResponse>) {
        self.push(agent, Reply::Stream(responses.into_iter().map(Ok).collect()));
    }

    /// Queue a stream that yields `responses` and then fails mid-stream.
    pub fn script_then_error(&self, agent: &str, responses: Vec<StreamResponse>, error: &str) {
        let mut items: Vec<Result<StreamResponse>> = responses.into_iter().map(Ok).collect();
        items.push(Err(ConduitError::Stream(error.to_string())));
        self.push(agent, Reply::Stream(items));
    }

    /// Make the next send to `agent` fail before any stream opens.
    pub fn fail_next(&self, agent: &str, error: &str) {
        self.push(agent, Reply::Fail(error.to_string()));
    }

    fn push(&self, agent: &str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .entry(agent.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Every message sent, with the receiving agent's name.
    pub fn sent(&self) -> Vec<(String, Message)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to one agent.
    pub fn sent_to(&self, agent: &str) -> Vec<Message> {
        self.sent()
            .into_iter()
            .filter(|(name, _)| name == agent)
            .map(|(_, msg)| msg)
            .collect()
    }
}

impl AgentTransport for ScriptedTransport {
    fn send_message_stream<'a>(
        &'a self,
        card: &AgentCard,
        params: MessageSendParams,
    ) -> BoxFuture<'a, Result<ResponseStream<'a>>> {
        let agent = card.name.clone();
        Box::pin(async move {
            self.sent.lock().unwrap().push((agent.clone(), params.message));
            let reply = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&agent)
                .and_then(VecDeque::pop_front);
            match reply {
                Some(Reply::Stream(items)) => Ok(futures::stream::iter(items).boxed()),
                Some(Reply::Fail(msg)) => Err(ConduitError::Transport(msg)),
                None => Err(ConduitError::Transport(format!("no script left for agent '{}'", agent))),
            }
        })
    }
}
