//! Service configuration resolved from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use fileindex::path::strip_trailing_slash;
use fileindex::SyncConfig;

use crate::error::{ServerError, ServerResult};

pub const BASE_DIR_VAR: &str = "SILO_BASE";
pub const LISTEN_ADDR_VAR: &str = "SILO_HOST";
pub const SYNC_SECS_VAR: &str = "SILO_SYNC_SECS";

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_SYNC_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiloConfig {
    /// Directory served and indexed. Never ends with a slash.
    pub base_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub sync_interval: Duration,
}

impl SiloConfig {
    /// Loads an optional `.env` file from the working directory, then reads
    /// the process environment.
    pub fn from_env() -> ServerResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolves the configuration through `lookup`, which maps a variable
    /// name to its value.
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_base = lookup(BASE_DIR_VAR)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ServerError::Config(format!("{BASE_DIR_VAR} must be set")))?;
        let base_dir = PathBuf::from(strip_base(raw_base.trim()));
        if !base_dir.is_dir() {
            return Err(ServerError::BaseDirMissing(base_dir));
        }

        let raw_addr = lookup(LISTEN_ADDR_VAR).unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = raw_addr.trim().parse::<SocketAddr>().map_err(|error| {
            ServerError::Config(format!("{LISTEN_ADDR_VAR}={raw_addr}: {error}"))
        })?;

        let sync_secs = match lookup(SYNC_SECS_VAR) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ServerError::Config(format!(
                        "{SYNC_SECS_VAR}={raw}: expected a positive number of seconds"
                    )))
                }
            },
            None => DEFAULT_SYNC_SECS,
        };

        Ok(Self {
            base_dir,
            listen_addr,
            sync_interval: Duration::from_secs(sync_secs),
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: self.sync_interval,
        }
    }
}

fn strip_base(raw: &str) -> &str {
    let mut base = raw;
    while base.len() > 1 && base.ends_with('/') {
        base = strip_trailing_slash(base);
    }
    base
}
