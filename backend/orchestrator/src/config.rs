//! Application configuration loaded from environment variables.

use crate::errors::{CoreError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Name under which the ledger program identity is derived
    pub program_name: String,
    /// Seed for the releasing authority's development identity. Real key
    /// custody belongs to an external wallet collaborator.
    pub authority_seed: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./openbudget.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| CoreError::Config("Invalid API_PORT".to_string()))?,
            program_name: env_var("LEDGER_PROGRAM")
                .unwrap_or_else(|_| "openbudget".to_string()),
            authority_seed: env_var("AUTHORITY_SEED")
                .unwrap_or_else(|_| "dev-authority".to_string()),
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| CoreError::Config(format!("Missing env var: {key}")))
}
