//! Application configuration loaded from environment variables.
//!
//! Every variable is optional:
//! - `CAMBIST_REST_URL`: REST API base URL
//! - `CAMBIST_STREAM_URL`: WebSocket stream base URL
//! - `CAMBIST_API_KEY`: API key sent with keyed and signed REST requests
//! - `CAMBIST_WS_KEEPALIVE`: enables the ping/pong keepalive (`true`/`false`)
//! - `CAMBIST_WS_TIMEOUT_SECS`: keepalive ping cadence and dead-peer threshold
//! - `CAMBIST_WS_PROXY`: proxy used for the WebSocket handshake, overriding
//!   `HTTP_PROXY`/`HTTPS_PROXY`
//! - `CAMBIST_CA_FILE`: PEM file whose certificates become the only trusted roots

use std::path::PathBuf;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::CambistError;
use crate::websocket::WsSettings;

/// Default REST endpoint.
const DEFAULT_REST_URL: &str = "https://api.binance.com";

/// Default WebSocket stream endpoint.
const DEFAULT_STREAM_URL: &str = "wss://stream.binance.com:9443";

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub rest: RestConfig,
    pub stream: StreamConfig,
}

/// REST API configuration values.
#[derive(Debug)]
pub struct RestConfig {
    pub base_url: String,
    pub api_key: Option<Zeroizing<String>>,
    pub ca_file: Option<PathBuf>,
}

/// WebSocket stream configuration values.
#[derive(Debug)]
pub struct StreamConfig {
    pub base_url: String,
    pub settings: WsSettings,
}

/// Loads the application configuration from environment variables.
///
/// Unset or empty variables fall back to their defaults.
///
/// # Errors
///
/// Returns [`CambistError::Config`] if `CAMBIST_WS_KEEPALIVE` is not a
/// recognised boolean or `CAMBIST_WS_TIMEOUT_SECS` is not a positive integer.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let rest_url = non_empty_var("CAMBIST_REST_URL").unwrap_or_else(|| DEFAULT_REST_URL.to_string());
    let stream_url =
        non_empty_var("CAMBIST_STREAM_URL").unwrap_or_else(|| DEFAULT_STREAM_URL.to_string());
    let api_key = non_empty_var("CAMBIST_API_KEY").map(Zeroizing::new);
    let ca_file = non_empty_var("CAMBIST_CA_FILE").map(PathBuf::from);

    let mut settings = WsSettings::default();
    if let Some(raw) = non_empty_var("CAMBIST_WS_KEEPALIVE") {
        settings.keepalive = parse_bool("CAMBIST_WS_KEEPALIVE", &raw)?;
    }
    if let Some(raw) = non_empty_var("CAMBIST_WS_TIMEOUT_SECS") {
        settings.timeout = parse_timeout("CAMBIST_WS_TIMEOUT_SECS", &raw)?;
    }
    settings.proxy_override = non_empty_var("CAMBIST_WS_PROXY");
    settings.ca_file = ca_file.clone();

    Ok(AppConfig {
        rest: RestConfig {
            base_url: rest_url,
            api_key,
            ca_file,
        },
        stream: StreamConfig {
            base_url: stream_url,
            settings,
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_bool(name: &str, raw: &str) -> crate::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(CambistError::Config(format!(
            "{name} must be a boolean, got {other:?}"
        ))),
    }
}

fn parse_timeout(name: &str, raw: &str) -> crate::Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| CambistError::Config(format!("{name} must be a whole number of seconds: {e}")))?;
    if secs == 0 {
        return Err(CambistError::Config(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
