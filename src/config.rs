//! Configuration management for the Quadrant server

use serde::Deserialize;
use std::env;

use crate::sync::MissingTargetPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// What to do when an update/delete references an id the server
    /// does not have. The original behavior is to skip silently.
    pub missing_target: MissingTargetPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "sqlite:./quadrant.db".to_string(),
            },
            sync: SyncConfig {
                missing_target: MissingTargetPolicy::Skip,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .unwrap_or(8000),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./quadrant.db".to_string()),
            },
            sync: SyncConfig {
                missing_target: match env::var("SYNC_MISSING_TARGET")
                    .unwrap_or_else(|_| "skip".to_string())
                    .as_str()
                {
                    "reject" => MissingTargetPolicy::Reject,
                    _ => MissingTargetPolicy::Skip,
                },
            },
        }
    }
}
