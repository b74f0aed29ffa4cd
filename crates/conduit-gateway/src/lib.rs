//! A2A gateway: serves the orchestrator's agent card and a JSON-RPC endpoint
//! speaking `message/send` and `message/stream`.

mod auth;
mod middleware;
mod projection;
mod routes;
mod server;
mod state;

pub use projection::TaskProjection;
pub use server::{router, GatewayServer};
pub use state::AppState;
