//! Agent-to-agent (A2A) client plumbing.
//!
//! [`A2aClient`] speaks JSON-RPC to remote agents and decodes `message/stream`
//! SSE responses; [`CardRegistry`] resolves agents from a static peer list.

pub mod client;
pub mod registry;
pub mod streaming;

pub use client::A2aClient;
pub use registry::CardRegistry;
pub use streaming::{SseEvent, SseParser, SseStream};
