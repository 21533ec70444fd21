//! Environment-driven service configuration

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub request_timeout: Duration,
    pub window_capacity: usize,
    pub window_overlap: usize,
    pub min_pnl_abs: f64,
    /// Simulated base-currency balance credited to each watched user.
    pub starting_balance: f64,
    /// Topic keys to watch at startup, comma separated.
    pub watched_topics: Vec<String>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("GROQ_API_KEY").context("GROQ_API_KEY must be set")?;
        let api_url = env::var("GROQ_API_URL")
            .unwrap_or_else(|_| "https://api.groq.com/openai/v1/chat/completions".to_string());
        let model =
            env::var("GROQ_MODEL").unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string());

        let watched_topics = env::var("WATCHED_TOPICS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            api_url,
            api_key,
            model,
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 30u64)?),
            window_capacity: env_or("WINDOW_CAPACITY", 4)?,
            window_overlap: env_or("WINDOW_OVERLAP", 3)?,
            min_pnl_abs: env_or("MIN_PNL_POTENTIAL", 10.0)?,
            starting_balance: env_or("STARTING_BALANCE", 1000.0)?,
            watched_topics,
        })
    }
}
