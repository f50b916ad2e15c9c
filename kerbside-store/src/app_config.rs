use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub feed: FeedConfig,
    pub auth: AuthConfig,
    pub sync: SyncRules,
}

/// Tunables for the occupancy publish/replay pipeline
#[derive(Debug, Deserialize, Clone)]
pub struct SyncRules {
    #[serde(default = "default_retry_attempts")]
    pub publish_retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub publish_retry_backoff_ms: u64,
    #[serde(default = "default_replay_interval_secs")]
    pub outbox_replay_interval_secs: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_replay_interval_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Remote occupancy feed transport: "memory" keeps everything in-process,
/// "redis" propagates across devices via pub/sub.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub mode: String,
    pub redis_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file
            // Default to 'development' env
            // Note that this file is _optional_
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add in a local configuration file
            // This file shouldn't be checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Add in settings from the environment (with a prefix of KERBSIDE)
            .add_source(config::Environment::with_prefix("KERBSIDE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
