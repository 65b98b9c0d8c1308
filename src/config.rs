//! Service configuration from environment variables

use crate::backend_process::ReadinessPolicy;
use crate::llm::DEFAULT_BASE_URL;
use crate::state_machine::MAX_TURNS_LIMIT;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MAX_TURNS: u32 = 4;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub ollama_host: String,
    pub max_turns: u32,
    pub use_context: bool,
    pub max_response_tokens: Option<u32>,
    pub request_timeout: Duration,
    /// Spawn `<bin> serve` at startup when set
    pub ollama_bin: Option<PathBuf>,
    pub readiness: ReadinessPolicy,
    /// Session log directory; logging is off when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ollama_host: DEFAULT_BASE_URL.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
            use_context: true,
            max_response_tokens: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ollama_bin: None,
            readiness: ReadinessPolicy::default(),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Invalid values keep the default and log a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let readiness = ReadinessPolicy {
            interval: parse_or(&get, "TALKING_HEADS_READY_INTERVAL_MS", None)
                .map_or(defaults.readiness.interval, Duration::from_millis),
            timeout: parse_or(&get, "TALKING_HEADS_READY_TIMEOUT_SECS", None)
                .map_or(defaults.readiness.timeout, Duration::from_secs),
        };

        Self {
            port: parse_or(&get, "TALKING_HEADS_PORT", Some(defaults.port))
                .unwrap_or(defaults.port),
            ollama_host: get("OLLAMA_HOST")
                .map_or(defaults.ollama_host, |h| normalize_host(&h)),
            max_turns: parse_or(&get, "TALKING_HEADS_MAX_TURNS", Some(defaults.max_turns))
                .map_or(defaults.max_turns, |turns| within_turn_limit(turns, defaults.max_turns)),
            use_context: get("TALKING_HEADS_USE_CONTEXT")
                .and_then(|v| parse_bool("TALKING_HEADS_USE_CONTEXT", &v))
                .unwrap_or(defaults.use_context),
            max_response_tokens: parse_or(&get, "TALKING_HEADS_MAX_RESPONSE_TOKENS", None),
            request_timeout: parse_or(&get, "TALKING_HEADS_REQUEST_TIMEOUT_SECS", None)
                .map_or(defaults.request_timeout, Duration::from_secs),
            ollama_bin: get("TALKING_HEADS_OLLAMA_BIN").map(PathBuf::from),
            readiness,
            log_dir: get("TALKING_HEADS_LOG_DIR").map(PathBuf::from),
        }
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    fallback: Option<T>,
) -> Option<T>
where
    T: std::fmt::Debug,
{
    let raw = get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, default = ?fallback, "Ignoring invalid configuration value");
            fallback
        }
    }
}

/// Same cap the running conversation enforces on option changes
fn within_turn_limit(turns: u32, fallback: u32) -> u32 {
    if turns > MAX_TURNS_LIMIT {
        tracing::warn!(
            key = "TALKING_HEADS_MAX_TURNS",
            value = turns,
            limit = MAX_TURNS_LIMIT,
            default = fallback,
            "Ignoring turn budget above the limit"
        );
        return fallback;
    }
    turns
}

fn parse_bool(key: &str, raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring invalid boolean configuration value");
            None
        }
    }
}

/// `OLLAMA_HOST` may be a bare `host:port`
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}
