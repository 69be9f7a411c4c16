// src/config.rs
use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// How updates reach the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// `getUpdates` long polling.
    Polling,
    /// Telegram pushes updates to our axum server.
    Webhook,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub api_url: String,
    pub admins: Vec<i64>,

    // Storage; no url means in-memory stores
    pub database_url: Option<String>,
    pub db_max_connections: u32,

    pub transport: Transport,
    pub port: u16,
    /// Public URL registered with Telegram on startup, if set.
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,

    pub request_timeout: Duration,
    pub recent_limit: u32,
    pub debug: bool,
}

impl Config {
    /// Load configuration from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bot_token = var("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let admins = parse_admins(&var("BOT_ADMINS").ok_or(ConfigError::Missing("BOT_ADMINS"))?)?;

        let transport = match var("TRANSPORT").as_deref() {
            None | Some("polling") => Transport::Polling,
            Some("webhook") => Transport::Webhook,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "TRANSPORT",
                    reason: format!("expected `polling` or `webhook`, got `{other}`"),
                })
            }
        };

        Ok(Self {
            bot_token,
            api_url: var("TELEGRAM_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            admins,
            database_url: var("DATABASE_URL"),
            db_max_connections: parse_number("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 5)?,
            transport,
            port: parse_number("PORT", var("PORT"), 3030)?,
            webhook_url: var("WEBHOOK_URL"),
            webhook_secret: var("WEBHOOK_SECRET"),
            request_timeout: Duration::from_millis(parse_number(
                "REQUEST_TIMEOUT_MS",
                var("REQUEST_TIMEOUT_MS"),
                5000,
            )?),
            recent_limit: parse_number("RECENT_LIMIT", var("RECENT_LIMIT"), 10)?,
            debug: var("DEBUG").is_some(),
        })
    }
}

fn parse_admins(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(|id| {
            id.trim().parse::<i64>().map_err(|e| ConfigError::Invalid {
                name: "BOT_ADMINS",
                reason: format!("`{}`: {}", id.trim(), e),
            })
        })
        .collect()
}

fn parse_number<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}
