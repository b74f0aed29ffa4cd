pub mod config;
pub mod error;
pub mod protocol;
pub mod traits;

pub use config::AppConfig;
pub use error::{ConduitError, Result};
pub use protocol::*;
