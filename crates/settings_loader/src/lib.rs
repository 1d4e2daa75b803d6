//! # Settings Loader
//!
//! Centralized configuration loading for the WriteOff backend. Every external
//! service the server talks to (bank aggregation API, language-model API,
//! hosted relational store) is configured here, from environment variables,
//! once at startup.
//!
//! Required variables fail fast with a contextual error; optional ones fall
//! back to documented defaults.

use std::env;

use anyhow::{Context, Result};

/// Aggregation-API credentials and endpoint.
#[derive(Debug, Clone)]
pub struct BankSettings {
    pub base_url: String,
    pub client_id: String,
    pub secret: String,
}

/// Language-model API endpoint, credential and model name.
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Hosted relational store endpoint and credentials.
///
/// The service key is the privileged server-side credential; the anon key is
/// the public one. User lookup tries the service key first and falls back to
/// the anon key (see the storage crate).
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub base_url: String,
    pub service_key: Option<String>,
    pub anon_key: String,
}

/// HTTP bind address for the API server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bank: BankSettings,
    pub ai: AiSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Loads all settings from the environment:
    /// - `BANK_API_BASE_URL` (default: `https://sandbox.plaid.com`)
    /// - `BANK_CLIENT_ID`, `BANK_SECRET` (required)
    /// - `AI_BASE_URL` (default: `https://api.openai.com`)
    /// - `AI_API_KEY` (required), `AI_MODEL` (default: `gpt-4o-mini`)
    /// - `STORAGE_URL`, `STORAGE_ANON_KEY` (required)
    /// - `STORAGE_SERVICE_KEY` (optional, enables the privileged lookup path)
    /// - `HOST` (default: `127.0.0.1`), `PORT` (default: `8080`)
    pub fn from_env() -> Result<Self> {
        let bank = BankSettings {
            base_url: optional("BANK_API_BASE_URL", "https://sandbox.plaid.com"),
            client_id: require("BANK_CLIENT_ID")?,
            secret: require("BANK_SECRET")?,
        };

        let ai = AiSettings {
            base_url: optional("AI_BASE_URL", "https://api.openai.com"),
            api_key: require("AI_API_KEY")?,
            model: optional("AI_MODEL", "gpt-4o-mini"),
        };

        let storage = StorageSettings {
            base_url: require("STORAGE_URL")?,
            service_key: env::var("STORAGE_SERVICE_KEY").ok().filter(|v| !v.is_empty()),
            anon_key: require("STORAGE_ANON_KEY")?,
        };

        let server = ServerSettings {
            host: optional("HOST", "127.0.0.1"),
            port: optional("PORT", "8080")
                .parse()
                .context("PORT must be a valid port number")?,
        };

        Ok(Self {
            bank,
            ai,
            storage,
            server,
        })
    }
}

fn require(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("Missing required environment variable: {name}"))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}
