use std::time::Duration;

use humantime::parse_duration;

use crate::error::ConfigError;
use crate::types::Level;

/// Reads `key`, treating an unset or blank variable as absent.
pub(super) fn lookup(key: &'static str) -> std::result::Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(ConfigError::InvalidField {
            field: key,
            message: err.to_string(),
        }),
    }
}

fn parsed<T, E>(
    key: &'static str,
    parse: impl FnOnce(&str) -> std::result::Result<T, E>,
) -> std::result::Result<Option<T>, ConfigError>
where
    E: std::fmt::Display,
{
    lookup(key)?
        .map(|value| {
            parse(&value).map_err(|err| ConfigError::InvalidField {
                field: key,
                message: err.to_string(),
            })
        })
        .transpose()
}

pub(super) fn env_usize(key: &'static str) -> std::result::Result<Option<usize>, ConfigError> {
    parsed(key, str::parse::<usize>)
}

pub(super) fn env_bool(key: &'static str) -> std::result::Result<Option<bool>, ConfigError> {
    parsed(key, |value| match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got {other}")),
    })
}

pub(super) fn env_duration(
    key: &'static str,
) -> std::result::Result<Option<Duration>, ConfigError> {
    parsed(key, parse_duration)
}

pub(super) fn env_level(key: &'static str) -> std::result::Result<Option<Level>, ConfigError> {
    parsed(key, str::parse::<Level>)
}
