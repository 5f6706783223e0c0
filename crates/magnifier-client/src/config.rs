use crate::correlation::CorrelatorConfig;
use crate::error::ConfigError;
use magnifier_core::DEFAULT_MAX_FRAME_BYTES;
use std::{env, time::Duration};
use url::Url;

pub const DEFAULT_URL: &str = "ws://localhost:9001/ws";
pub const DEFAULT_LOG_DIR: &str = ".magnifier/logs";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub url: Url,
    pub session_id: String,
    pub request_timeout: Option<Duration>,
    pub max_frame_bytes: usize,
    pub log_dir: String,
    pub log_stdout: bool,
}

impl ClientConfig {
    pub fn correlator_config(&self) -> CorrelatorConfig {
        CorrelatorConfig {
            request_timeout: self.request_timeout,
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

/// Raw flag values; empty strings mean "not given".
#[derive(Clone, Debug, Default)]
pub struct ConfigFlags {
    pub url: String,
    pub session: String,
    pub log_dir: String,
    pub request_timeout_ms: String,
    pub max_frame_bytes: Option<usize>,
}

pub fn load_config(flags: &ConfigFlags) -> Result<ClientConfig, ConfigError> {
    Ok(ClientConfig {
        url: resolve_url(&flags.url)?,
        session_id: resolve_session_id(&flags.session),
        request_timeout: resolve_request_timeout(&flags.request_timeout_ms)?,
        max_frame_bytes: flags.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES),
        log_dir: resolve_log_dir(&flags.log_dir),
        log_stdout: resolve_log_stdout(),
    })
}

fn flag_or_env(flag: &str, key: &str) -> Option<String> {
    if !flag.trim().is_empty() {
        return Some(flag.trim().to_string());
    }
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

pub fn resolve_url(flag: &str) -> Result<Url, ConfigError> {
    let value = flag_or_env(flag, "MAGNIFIER_URL").unwrap_or_else(|| DEFAULT_URL.to_string());
    Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { value, source })
}

pub fn resolve_session_id(flag: &str) -> String {
    flag_or_env(flag, "MAGNIFIER_SESSION_ID")
        .unwrap_or_else(|| format!("pid-{}", std::process::id()))
}

pub fn resolve_request_timeout(flag: &str) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = flag_or_env(flag, "MAGNIFIER_REQUEST_TIMEOUT_MS") else {
        return Ok(None);
    };
    match value.parse::<u64>() {
        Ok(0) => Ok(None),
        Ok(ms) => Ok(Some(Duration::from_millis(ms))),
        Err(_) => Err(ConfigError::InvalidTimeout(value)),
    }
}

pub fn resolve_log_dir(flag: &str) -> String {
    flag_or_env(flag, "MAGNIFIER_LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string())
}

pub fn resolve_log_stdout() -> bool {
    env::var("MAGNIFIER_LOG_STDOUT")
        .ok()
        .and_then(|value| parse_bool_env(&value))
        .unwrap_or(false)
}

pub fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
