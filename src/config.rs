use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
pub const DEFAULT_TEST_FILE: &str = "performanceTest.html";
pub const DEFAULT_REDIRECT_PAGE: &str = "301.html";
pub const DEFAULT_UNAVAILABLE_PAGE: &str = "503.html";
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Clone, Debug)]
pub struct BalancerConfig {
    /// How long the listener may sit without a new client before the
    /// backends are probed again.
    pub idle_timeout: Duration,
    /// Connect and read timeout for each probe.
    pub probe_timeout: Duration,
    /// Read timeout on accepted client connections.
    pub client_timeout: Duration,
    pub poll_interval: Duration,
    /// Path requested from every backend when measuring it.
    pub test_file: String,
    pub redirect_page: PathBuf,
    pub unavailable_page: PathBuf,
    pub bind_host: String,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        BalancerConfig {
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            client_timeout: Duration::from_secs(DEFAULT_CLIENT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            test_file: DEFAULT_TEST_FILE.to_string(),
            redirect_page: PathBuf::from(DEFAULT_REDIRECT_PAGE),
            unavailable_page: PathBuf::from(DEFAULT_UNAVAILABLE_PAGE),
            bind_host: DEFAULT_BIND_HOST.to_string(),
        }
    }
}

impl BalancerConfig {
    /// Reads every setting from the environment, keeping the default for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        BalancerConfig {
            idle_timeout: Duration::from_secs(env_or("IDLE_TIMEOUT", DEFAULT_IDLE_TIMEOUT_SECS)),
            probe_timeout: Duration::from_secs(env_or("PROBE_TIMEOUT", DEFAULT_PROBE_TIMEOUT_SECS)),
            client_timeout: Duration::from_secs(env_or("CLIENT_TIMEOUT", DEFAULT_CLIENT_TIMEOUT_SECS)),
            poll_interval: Duration::from_millis(env_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)),
            test_file: env::var("TEST_FILE").unwrap_or_else(|_| DEFAULT_TEST_FILE.to_string()),
            redirect_page: env::var("REDIRECT_PAGE")
                .unwrap_or_else(|_| DEFAULT_REDIRECT_PAGE.to_string())
                .into(),
            unavailable_page: env::var("UNAVAILABLE_PAGE")
                .unwrap_or_else(|_| DEFAULT_UNAVAILABLE_PAGE.to_string())
                .into(),
            bind_host: env::var("BIND_HOST").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string()),
        }
    }
}

fn env_or(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(val) => parse_or(key, &val, default),
        Err(_) => default,
    }
}

/// Timeouts and intervals must be positive: std rejects a zero socket
/// timeout and a zero poll interval spins the accept loop.
fn parse_or(key: &str, val: &str, default: u64) -> u64 {
    match val.trim().parse() {
        Ok(parsed) => positive_or(key, parsed, default),
        Err(_) => {
            log::warn!("⚠️ Failed to parse {} (value={}), using default", key, val);
            default
        }
    }
}

/// Returns `value` unless it is zero, in which case `default` is used.
pub fn positive_or(key: &str, value: u64, default: u64) -> u64 {
    if value == 0 {
        log::warn!("⚠️ {} must be greater than zero, using default {}", key, default);
        return default;
    }
    value
}
