use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::handlers::template;

pub const DEFAULT_SUBMIT_PATH: &str = "/api/forms/{{form_id}}/submissions";
pub const DEFAULT_STOP_STATUS_PATH: &str = "/api/stops/{{stop_id}}/status";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    /// Base URL of the remote forms API the outbox delivers to.
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub submit_path: String,
    pub stop_status_path: String,
    pub concurrency: usize,
    /// 0 means retry forever.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub handler_timeout: Duration,
    pub request_timeout: Duration,
    pub retry_interval: Duration,
    pub start_online: bool,
    pub probe_url: Option<String>,
    pub probe_interval: Duration,
    pub max_body_size: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_or("DATABASE_URL", "sqlite://outbox.db?mode=rwc");
        let api_base_url = env_required("OUTBOX_API_BASE_URL")?;
        if !api_base_url.starts_with("http://") && !api_base_url.starts_with("https://") {
            return Err(format!("Invalid OUTBOX_API_BASE_URL: {api_base_url}"));
        }

        let host: IpAddr = env_parse("OUTBOX_HOST", "127.0.0.1")?;
        let port: u16 = env_parse("OUTBOX_PORT", "4100")?;

        let api_token = std::env::var("OUTBOX_API_TOKEN").ok().filter(|t| !t.is_empty());

        let submit_path = env_or("OUTBOX_SUBMIT_PATH", DEFAULT_SUBMIT_PATH);
        template::validate(&submit_path).map_err(|e| format!("Invalid OUTBOX_SUBMIT_PATH: {e}"))?;
        let stop_status_path = env_or("OUTBOX_STOP_STATUS_PATH", DEFAULT_STOP_STATUS_PATH);
        template::validate(&stop_status_path)
            .map_err(|e| format!("Invalid OUTBOX_STOP_STATUS_PATH: {e}"))?;

        let concurrency: usize = env_parse("OUTBOX_CONCURRENCY", "3")?;

        let max_attempts: u32 = env_parse("OUTBOX_MAX_ATTEMPTS", "10")?;
        let backoff_base = Duration::from_secs(env_parse("OUTBOX_BACKOFF_BASE_SECS", "2")?);
        let backoff_max = Duration::from_secs(env_parse("OUTBOX_BACKOFF_MAX_SECS", "3600")?);
        let handler_timeout = Duration::from_secs(env_parse("OUTBOX_HANDLER_TIMEOUT_SECS", "30")?);
        let request_timeout = Duration::from_secs(env_parse("OUTBOX_REQUEST_TIMEOUT_SECS", "20")?);
        let retry_interval = Duration::from_secs(env_parse("OUTBOX_RETRY_INTERVAL_SECS", "30")?);

        let start_online = env_bool("OUTBOX_START_ONLINE", true)?;
        let probe_url = std::env::var("OUTBOX_PROBE_URL").ok().filter(|u| !u.is_empty());
        let probe_interval = Duration::from_secs(env_parse("OUTBOX_PROBE_INTERVAL_SECS", "15")?);

        let max_body_size: usize = env_parse("OUTBOX_MAX_BODY_SIZE", "1048576")?;
        let log_level = env_or("OUTBOX_LOG_LEVEL", "info");

        let config = Config {
            database_url,
            host,
            port,
            api_base_url,
            api_token,
            submit_path,
            stop_status_path,
            concurrency,
            max_attempts,
            backoff_base,
            backoff_max,
            handler_timeout,
            request_timeout,
            retry_interval,
            start_online,
            probe_url,
            probe_interval,
            max_body_size,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or spin the sync worker.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("Invalid OUTBOX_CONCURRENCY: must be at least 1".to_string());
        }
        if self.handler_timeout.is_zero() {
            return Err("Invalid OUTBOX_HANDLER_TIMEOUT_SECS: must be at least 1".to_string());
        }
        if self.retry_interval.is_zero() {
            return Err("Invalid OUTBOX_RETRY_INTERVAL_SECS: must be at least 1".to_string());
        }
        if self.probe_url.is_some() && self.probe_interval.is_zero() {
            return Err("Invalid OUTBOX_PROBE_INTERVAL_SECS: must be at least 1".to_string());
        }
        Ok(())
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_or(key, default)
        .trim()
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}

fn env_bool(key: &str, default: bool) -> Result<bool, String> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(format!("Invalid {key}: {other}")),
        },
    }
}
