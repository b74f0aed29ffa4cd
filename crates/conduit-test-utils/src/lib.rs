//! Shared test utilities for Conduit crates.
//!
//! Scripted resolver/transport doubles plus A2A response fixtures.

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::{ScriptedResolver, ScriptedTransport};
