//! Runtime configuration for the play client and the sandbox backend.
//!
//! Values come from the process environment (a `.env` file is honoured via
//! `dotenv`). Anything missing or unparsable falls back to the defaults below.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default casino API base URL
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default timeout for a single API request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimum time a settled round is presented before its result is shown
pub const DEFAULT_PRESENTATION_WINDOW_MS: u64 = 6_500;

/// Dashboard refresh cadence
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Sandbox listen address
pub const DEFAULT_SANDBOX_ADDR: &str = "0.0.0.0:8000";

/// Lifetime of a staff-initiated OTP ticket
pub const DEFAULT_OTP_TTL_SECS: u64 = 300;

/// Open game sessions older than this are closed server-side
pub const DEFAULT_SESSION_MAX_AGE_SECS: u64 = 7_200;

// ============================================================================
// CLIENT CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the casino API, without trailing slash
    pub base_url: String,
    pub request_timeout: Duration,
    /// How long a round's outcome is held back after the engine answers
    pub presentation_window: Duration,
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            presentation_window: Duration::from_millis(DEFAULT_PRESENTATION_WINDOW_MS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Load from `CASINO_*` environment variables
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let base_url = std::env::var("CASINO_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        Self {
            base_url,
            request_timeout: Duration::from_secs(env_or(
                "CASINO_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            presentation_window: Duration::from_millis(env_or(
                "CASINO_PRESENTATION_WINDOW_MS",
                DEFAULT_PRESENTATION_WINDOW_MS,
            )),
            poll_interval: Duration::from_secs(env_or(
                "CASINO_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
        }
    }

    pub fn with_presentation_window(mut self, window: Duration) -> Self {
        self.presentation_window = window;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Join an API path onto the base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

// ============================================================================
// SANDBOX CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub bind_addr: SocketAddr,
    pub otp_ttl: Duration,
    pub session_max_age: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            otp_ttl: Duration::from_secs(DEFAULT_OTP_TTL_SECS),
            session_max_age: Duration::from_secs(DEFAULT_SESSION_MAX_AGE_SECS),
        }
    }
}

impl SandboxConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            bind_addr: env_or("SANDBOX_BIND_ADDR", Self::default().bind_addr),
            otp_ttl: Duration::from_secs(env_or("SANDBOX_OTP_TTL_SECS", DEFAULT_OTP_TTL_SECS)),
            session_max_age: Duration::from_secs(env_or(
                "SANDBOX_SESSION_MAX_AGE_SECS",
                DEFAULT_SESSION_MAX_AGE_SECS,
            )),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw = %raw, ?default, "unparsable config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_product_values() {
        let config = ClientConfig::default();
        assert_eq!(config.presentation_window, Duration::from_millis(6_500));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(SandboxConfig::default().otp_ttl, Duration::from_secs(300));
        assert_eq!(DEFAULT_SANDBOX_ADDR.parse::<SocketAddr>().unwrap(), SandboxConfig::default().bind_addr);
    }

    #[test]
    fn test_url_joining() {
        let config = ClientConfig::new("http://casino.local:8000/");
        assert_eq!(config.url("/engine/play/g1"), "http://casino.local:8000/engine/play/g1");
        assert_eq!(config.url("players/dashboard"), "http://casino.local:8000/players/dashboard");
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CASINO_TEST_ENV_OR_GARBAGE", "not-a-number");
        assert_eq!(env_or("CASINO_TEST_ENV_OR_GARBAGE", 42u64), 42);
        std::env::set_var("CASINO_TEST_ENV_OR_GOOD", " 7 ");
        assert_eq!(env_or("CASINO_TEST_ENV_OR_GOOD", 42u64), 7);
    }
}
