use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::Result;
use crate::card::CardOptions;
use crate::error::{ConfigError, Error as SinkError};
use crate::format::{FormatProvider, InvariantFormat};
use crate::scheduler::FailureHook;
use crate::transport::Transport;
use crate::types::Level;

mod defaults;
mod env;
mod raw;
mod serde;

pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 50;
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to start a [`TeamsSink`](crate::TeamsSink).
#[derive(Clone)]
pub struct SinkOptions {
    /// Incoming webhook address. Required; kept secret because it embeds a token.
    pub webhook_url: SecretString,
    pub title: Option<String>,
    pub batch_size_limit: usize,
    pub period: Duration,
    pub format_provider: Option<Arc<dyn FormatProvider>>,
    pub render_properties: bool,
    /// Records below this level are dropped by `emit`.
    pub minimum_level: Level,
    /// Caller-supplied transport. The sink never closes it.
    pub transport: Option<Arc<dyn Transport>>,
    pub http_request_timeout: Duration,
    pub http_connect_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub on_batch_failure: Option<FailureHook>,
}

impl SinkOptions {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: SecretString::from(webhook_url.into()),
            title: None,
            batch_size_limit: DEFAULT_BATCH_SIZE_LIMIT,
            period: DEFAULT_PERIOD,
            format_provider: None,
            render_properties: true,
            minimum_level: Level::Verbose,
            transport: None,
            http_request_timeout: DEFAULT_HTTP_TIMEOUT,
            http_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            on_batch_failure: None,
        }
    }

    /// Load options from a TOML file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration file cannot be read, parsed,
    /// when environment overrides are invalid, or when the resulting values
    /// fail validation.
    pub fn from_env_and_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_sources(path, None)
    }

    /// Like [`from_env_and_file`](Self::from_env_and_file), with a webhook
    /// address that takes precedence over both sources when given.
    ///
    /// # Errors
    ///
    /// Same as [`from_env_and_file`](Self::from_env_and_file).
    pub fn from_sources(path: impl AsRef<Path>, webhook_url: Option<&str>) -> Result<Self> {
        let mut raw = raw::load(path).map_err(SinkError::from)?;
        raw.apply_env_overrides().map_err(SinkError::from)?;
        if let Some(url) = webhook_url {
            raw.webhook.url = Some(url.to_string());
        }
        raw.validate_and_build()
    }

    #[must_use]
    /// Sets the card title; a blank title leaves the card untitled.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        let title = title.into();
        self.title = (!title.trim().is_empty()).then_some(title);
        self
    }

    #[must_use]
    pub const fn with_batch_size_limit(mut self, limit: usize) -> Self {
        self.batch_size_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_format_provider(mut self, provider: Arc<dyn FormatProvider>) -> Self {
        self.format_provider = Some(provider);
        self
    }

    #[must_use]
    pub const fn with_render_properties(mut self, render: bool) -> Self {
        self.render_properties = render;
        self
    }

    #[must_use]
    pub const fn with_minimum_level(mut self, level: Level) -> Self {
        self.minimum_level = level;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn on_batch_failure(
        mut self,
        hook: impl Fn(&crate::error::BatchFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_batch_failure = Some(Arc::new(hook));
        self
    }

    /// Checks the options and returns the parsed webhook address.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a blank or malformed webhook address, a
    /// zero batch size limit, or a zero period or shutdown timeout.
    pub fn validate(&self) -> std::result::Result<Url, ConfigError> {
        let raw_url = self.webhook_url.expose_secret().trim();
        if raw_url.is_empty() {
            return Err(ConfigError::MissingField {
                field: "webhook.url",
            });
        }
        let url = Url::parse(raw_url).map_err(|err| ConfigError::InvalidField {
            field: "webhook.url",
            message: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidField {
                field: "webhook.url",
                message: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.batch_size_limit == 0 {
            return Err(ConfigError::InvalidField {
                field: "batch.size_limit",
                message: "batch size limit must be at least 1".to_string(),
            });
        }
        if self.period.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "batch.period",
                message: "period must be greater than zero".to_string(),
            });
        }
        if self.shutdown_timeout.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "batch.shutdown_timeout",
                message: "shutdown timeout must be greater than zero".to_string(),
            });
        }
        Ok(url)
    }

    pub(crate) fn card_options(&self) -> CardOptions {
        CardOptions {
            title: self
                .title
                .clone()
                .filter(|title| !title.trim().is_empty()),
            format_provider: self
                .format_provider
                .clone()
                .unwrap_or_else(|| Arc::new(InvariantFormat)),
            render_properties: self.render_properties,
        }
    }
}

impl fmt::Debug for SinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkOptions")
            .field("webhook_url", &"[REDACTED]")
            .field("title", &self.title)
            .field("batch_size_limit", &self.batch_size_limit)
            .field("period", &self.period)
            .field("format_provider", &self.format_provider)
            .field("render_properties", &self.render_properties)
            .field("minimum_level", &self.minimum_level)
            .field("transport", &self.transport.as_ref().map(|_| "<supplied>"))
            .field("http_request_timeout", &self.http_request_timeout)
            .field("http_connect_timeout", &self.http_connect_timeout)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}
