// ABOUTME: Server configuration loaded from environment variables
// ABOUTME: Port, CORS origin, and database location

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(#[from] ParseIntError),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub cors_origin: String,
    /// Database file path; defaults to the app data directory when unset
    pub database_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "4001".to_string());

        let port = port_str.parse::<u16>()?;
        if port == 0 {
            return Err(ConfigError::PortOutOfRange(port));
        }

        // The dashboard origin doubles as the CORS allowlist entry
        let cors_origin = env::var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        let database_path = env::var("DATABASE_PATH").ok().map(PathBuf::from);

        Ok(Config {
            port,
            cors_origin,
            database_path,
        })
    }
}
