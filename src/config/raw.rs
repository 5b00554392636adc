use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use serde_with::serde_as;

use crate::Result;
use crate::error::ConfigError;
use crate::format::LocaleFormat;
use crate::types::Level;

use super::SinkOptions;
use super::defaults::{
    default_batch_size_limit, default_connect_timeout, default_minimum_level, default_period,
    default_render_properties, default_request_timeout, default_shutdown_timeout,
};
use super::env::{env_bool, env_duration, env_level, env_usize, lookup};
use super::serde::HumantimeDuration;

const ENV_PREFIX: &str = "TEAMS_SINK";

pub(super) fn load(path: impl AsRef<Path>) -> std::result::Result<RawConfig, ConfigError> {
    let builder = ::config::Config::builder()
        .add_source(::config::File::from(path.as_ref()).required(false))
        .add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

    builder
        .build()
        .map_err(|err| ConfigError::Other(err.to_string()))?
        .try_deserialize()
        .map_err(|err| ConfigError::Parse(err.to_string()))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub(super) webhook: RawWebhook,
    #[serde(default)]
    pub(super) batch: RawBatch,
    #[serde(default)]
    pub(super) http: RawHttp,
    #[serde(default)]
    pub(super) format: RawFormat,
}

#[derive(Debug, Deserialize)]
pub(super) struct RawWebhook {
    pub(super) url: Option<String>,
    #[serde(default)]
    pub(super) title: Option<String>,
    #[serde(default = "default_render_properties")]
    pub(super) render_properties: bool,
    #[serde(default = "default_minimum_level")]
    pub(super) minimum_level: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawBatch {
    #[serde(default = "default_batch_size_limit")]
    pub(super) size_limit: usize,
    #[serde(default = "default_period")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) period: Duration,
    #[serde(default = "default_shutdown_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) shutdown_timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize)]
pub(super) struct RawHttp {
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) request_timeout: Duration,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "HumantimeDuration")]
    pub(super) connect_timeout: Duration,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct RawFormat {
    #[serde(default)]
    pub(super) decimal_separator: Option<String>,
    #[serde(default)]
    pub(super) timestamp_format: Option<String>,
}

impl RawConfig {
    pub(super) fn apply_env_overrides(&mut self) -> std::result::Result<(), ConfigError> {
        if let Some(url) = lookup("TEAMS_WEBHOOK_URL")? {
            self.webhook.url = Some(url);
        }
        if let Some(title) = lookup("TEAMS_TITLE")? {
            self.webhook.title = Some(title);
        }
        if let Some(render) = env_bool("TEAMS_RENDER_PROPERTIES")? {
            self.webhook.render_properties = render;
        }
        if let Some(level) = env_level("TEAMS_MINIMUM_LEVEL")? {
            self.webhook.minimum_level = level.to_string();
        }
        if let Some(limit) = env_usize("TEAMS_BATCH_SIZE_LIMIT")? {
            self.batch.size_limit = limit;
        }
        if let Some(period) = env_duration("TEAMS_PERIOD")? {
            self.batch.period = period;
        }
        Ok(())
    }

    pub(super) fn validate_and_build(self) -> Result<SinkOptions> {
        let url = self.webhook.url.ok_or(ConfigError::MissingField {
            field: "webhook.url",
        })?;
        let minimum_level =
            self.webhook
                .minimum_level
                .parse::<Level>()
                .map_err(|err| ConfigError::InvalidField {
                    field: "webhook.minimum_level",
                    message: err,
                })?;

        let locale = self.format.into_locale()?;

        let mut options = SinkOptions::new(String::new());
        options.webhook_url = SecretString::from(url);
        options.title = self.webhook.title.filter(|t| !t.trim().is_empty());
        options.render_properties = self.webhook.render_properties;
        options.minimum_level = minimum_level;
        options.batch_size_limit = self.batch.size_limit;
        options.period = self.batch.period;
        options.shutdown_timeout = self.batch.shutdown_timeout;
        options.http_request_timeout = self.http.request_timeout;
        options.http_connect_timeout = self.http.connect_timeout;
        options.format_provider = locale.map(|l| Arc::new(l) as Arc<dyn crate::FormatProvider>);

        options.validate()?;
        Ok(options)
    }
}

impl RawFormat {
    fn into_locale(self) -> std::result::Result<Option<LocaleFormat>, ConfigError> {
        if self.decimal_separator.is_none() && self.timestamp_format.is_none() {
            return Ok(None);
        }
        let mut locale = LocaleFormat::default();
        if let Some(sep) = self.decimal_separator {
            let mut chars = sep.chars();
            locale.decimal_separator = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(ConfigError::InvalidField {
                        field: "format.decimal_separator",
                        message: format!("expected a single character, got {sep:?}"),
                    });
                }
            };
        }
        if let Some(pattern) = self.timestamp_format {
            locale.timestamp_format = pattern;
        }
        Ok(Some(locale))
    }
}

impl Default for RawWebhook {
    fn default() -> Self {
        Self {
            url: None,
            title: None,
            render_properties: default_render_properties(),
            minimum_level: default_minimum_level(),
        }
    }
}

impl Default for RawBatch {
    fn default() -> Self {
        Self {
            size_limit: default_batch_size_limit(),
            period: default_period(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Default for RawHttp {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RawConfig;
    use crate::error::{ConfigError, Error};
    use crate::types::Level;
    use std::time::Duration;

    fn parse(toml: &str) -> RawConfig {
        ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn full_file_builds_options() {
        let options = parse(
            r#"
            [webhook]
            url = "https://example.webhook.office.com/webhookb2/abc"
            title = "prod"
            render_properties = false
            minimum_level = "warning"

            [batch]
            size_limit = 10
            period = "2s"

            [format]
            decimal_separator = ","
            "#,
        )
        .validate_and_build()
        .unwrap();

        assert_eq!(options.title.as_deref(), Some("prod"));
        assert!(!options.render_properties);
        assert_eq!(options.minimum_level, Level::Warning);
        assert_eq!(options.batch_size_limit, 10);
        assert_eq!(options.period, Duration::from_secs(2));
        assert!(options.format_provider.is_some());
    }

    #[test]
    fn missing_url_is_reported() {
        let err = parse("[batch]\nsize_limit = 3\n")
            .validate_and_build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MissingField {
                field: "webhook.url"
            })
        ));
    }

    #[test]
    fn zero_batch_size_is_reported() {
        let err = parse("[webhook]\nurl = \"https://h.example/x\"\n[batch]\nsize_limit = 0\n")
            .validate_and_build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn multi_char_separator_is_rejected() {
        let err = parse(
            "[webhook]\nurl = \"https://h.example/x\"\n[format]\ndecimal_separator = \",,\"\n",
        )
        .validate_and_build()
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidField {
                field: "format.decimal_separator",
                ..
            })
        ));
    }

    #[test]
    fn defaults_apply_to_empty_file() {
        let raw = parse("");
        assert_eq!(raw.batch.size_limit, 50);
        assert_eq!(raw.batch.period, Duration::from_secs(5));
        assert!(raw.webhook.render_properties);
    }
}
