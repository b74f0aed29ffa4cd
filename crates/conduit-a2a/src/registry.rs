use std::collections::HashSet;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use conduit_core::config::DiscoveryConfig;
use conduit_core::error::{ConduitError, Result};
use conduit_core::protocol::AgentCard;
use conduit_core::traits::AgentResolver;

use crate::client::A2aClient;

/// Static agent registry.
///
/// Holds the cards of a fixed set of peer agents. The planner is looked up by
/// name; every other task is matched against the remaining cards by keyword
/// overlap.
#[derive(Debug, Clone, Default)]
pub struct CardRegistry {
    planner: Option<String>,
    entries: Vec<(String, AgentCard)>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a card under a peer name. Re-registering a name replaces the
    /// card but keeps its original position.
    pub fn register(&mut self, name: impl Into<String>, card: AgentCard) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = card,
            None => self.entries.push((name, card)),
        }
    }

    /// Mark a registered peer as the planner.
    pub fn set_planner(&mut self, name: impl Into<String>) {
        self.planner = Some(name.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AgentCard> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, card)| card)
    }

    /// Fetch every configured peer's card.
    ///
    /// Unreachable peers are skipped with a warning; the planner is required.
    pub async fn discover(config: &DiscoveryConfig, client: &A2aClient) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::new();

        for peer in &config.agents {
            match client.fetch_agent_card(&peer.url).await {
                Ok(card) => registry.register(peer.name.clone(), card),
                Err(e) => warn!(agent = %peer.name, url = %peer.url, error = %e, "Skipping unreachable agent"),
            }
        }

        if let Some(planner) = &config.planner {
            if registry.get(planner).is_none() {
                return Err(ConduitError::Discovery(format!(
                    "planner agent '{}' could not be reached",
                    planner
                )));
            }
            registry.set_planner(planner.clone());
        }

        info!(agents = registry.len(), "Agent registry ready");
        Ok(registry)
    }

    fn best_match(&self, task: &str) -> Option<&AgentCard> {
        let terms = tokenize(task);
        let mut best: Option<(usize, &AgentCard)> = None;

        for (name, card) in &self.entries {
            if self.planner.as_deref() == Some(name.as_str()) {
                continue;
            }
            let vocabulary = card_vocabulary(card);
            let score = terms.iter().filter(|t| vocabulary.contains(*t)).count();
            debug!(agent = %name, score, "Scored agent for task");
            if score > 0 && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, card));
            }
        }

        best.map(|(_, card)| card)
    }
}

/// Distinct lowercase alphanumeric words of three or more characters.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
        .collect()
}

fn card_vocabulary(card: &AgentCard) -> HashSet<String> {
    let mut words = tokenize(&card.name);
    if let Some(desc) = &card.description {
        words.extend(tokenize(desc));
    }
    for skill in &card.skills {
        words.extend(tokenize(&skill.name));
        if let Some(desc) = &skill.description {
            words.extend(tokenize(desc));
        }
        for text in skill.tags.iter().chain(skill.examples.iter()) {
            words.extend(tokenize(text));
        }
    }
    words
}

impl AgentResolver for CardRegistry {
    fn planner_card(&self) -> BoxFuture<'_, Result<AgentCard>> {
        Box::pin(async move {
            self.planner
                .as_deref()
                .and_then(|name| self.get(name))
                .cloned()
                .ok_or_else(|| ConduitError::AgentNotFound("planner".into()))
        })
    }

    fn find_agent<'a>(&'a self, task: &'a str) -> BoxFuture<'a, Result<AgentCard>> {
        Box::pin(async move {
            self.best_match(task)
                .cloned()
                .ok_or_else(|| ConduitError::AgentNotFound(task.to_string()))
        })
    }
}
