use std::sync::Arc;

use conduit_core::config::GatewayConfig;
use conduit_core::protocol::AgentCard;
use conduit_workflow::OrchestratorAgent;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub card: AgentCard,
    pub orchestrator: Arc<OrchestratorAgent>,
}
