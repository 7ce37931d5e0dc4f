pub mod server;

pub mod config;
pub mod error;

pub use crate::config::SiloConfig;
pub use crate::error::{ServerError, ServerResult};
pub use crate::server::{router, Server, ServerState};
