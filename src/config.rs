//! Runtime configuration.
//!
//! This module provides runtime configuration for remote fetches.
//! Use [`ConfigBuilder`] at application startup to configure the User-Agent
//! string and the HTTP timeout.

use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration, initialized via [`ConfigBuilder::init`].
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Runtime configuration for remote reads.
#[derive(Debug, Clone)]
pub struct Config {
    /// User-Agent string for HTTP fetches.
    /// Example: "my-app/1.0.0"
    pub user_agent: String,
    /// Timeout applied to each HTTP request.
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: concat!("sourceprep/", env!("CARGO_PKG_VERSION")).to_string(),
            http_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration builder for fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    user_agent: Option<String>,
    http_timeout: Option<Duration>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the User-Agent string for HTTP fetches.
    ///
    /// Default: "sourceprep/{version}"
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the per-request HTTP timeout.
    ///
    /// Default: 10 seconds.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    /// Build and initialize the global configuration.
    ///
    /// This can only be called once. Subsequent calls are ignored.
    /// Returns `true` if configuration was set, `false` if already initialized.
    pub fn init(self) -> bool {
        let defaults = Config::default();
        let config = Config {
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            http_timeout: self.http_timeout.unwrap_or(defaults.http_timeout),
        };
        CONFIG.set(config).is_ok()
    }
}

/// Initialize with default configuration.
///
/// This is equivalent to `ConfigBuilder::new().init()`.
pub fn init_default() -> bool {
    ConfigBuilder::new().init()
}

/// Get the current configuration, or default if not initialized.
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}
