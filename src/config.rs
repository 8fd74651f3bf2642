use crate::matcher::MatchStrategy;
use reqwest::Url;
use std::path::PathBuf;
use teloxide::types::ChatId;

const DEFAULT_STORE_PATH: &str = "movie_catalog.json";
const DEFAULT_FORWARD_LIMIT: usize = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is missing")]
    Missing { var: &'static str },
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid { var: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub channel_id: ChatId,
    pub store_path: PathBuf,
    pub strategy: MatchStrategy,
    pub forward_limit: usize,
    pub api_url: Option<Url>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Пустые значения считаются отсутствующими.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("BOT_TOKEN")
            .or_else(|| get("TELOXIDE_TOKEN"))
            .ok_or(ConfigError::Missing { var: "BOT_TOKEN" })?;

        let raw_channel = get("CHANNEL_ID").ok_or(ConfigError::Missing { var: "CHANNEL_ID" })?;
        let channel_id = raw_channel
            .parse::<i64>()
            .map(ChatId)
            .map_err(|e| invalid("CHANNEL_ID", &raw_channel, e))?;

        let store_path = get("STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_PATH.to_string()).into();

        let strategy = match get("MATCH_STRATEGY") {
            Some(v) => v.parse().map_err(|e| invalid("MATCH_STRATEGY", &v, e))?,
            None => MatchStrategy::default(),
        };

        let forward_limit = match get("FORWARD_LIMIT") {
            Some(v) => match v.parse::<usize>() {
                Ok(0) => return Err(invalid("FORWARD_LIMIT", &v, "must be at least 1")),
                Ok(n) => n,
                Err(e) => return Err(invalid("FORWARD_LIMIT", &v, e)),
            },
            None => DEFAULT_FORWARD_LIMIT,
        };

        let api_url = get("TELEGRAM_API_URL")
            .map(|v| Url::parse(&v).map_err(|e| invalid("TELEGRAM_API_URL", &v, e)))
            .transpose()?;

        Ok(Self { token, channel_id, store_path, strategy, forward_limit, api_url })
    }
}

fn invalid(var: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid { var, value: value.to_string(), reason: reason.to_string() }
}
