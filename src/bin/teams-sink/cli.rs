use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use humantime::parse_duration;
use teams_sink::Level;

#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Post log messages to a Microsoft Teams webhook",
    long_about = None
)]
pub struct Cli {
    /// Messages to send; lines are read from stdin when none are given.
    #[arg(value_name = "MESSAGE")]
    pub messages: Vec<String>,

    /// TOML configuration file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Incoming webhook address, overriding the configuration.
    #[arg(long, value_name = "URL")]
    pub webhook_url: Option<String>,

    /// Card title.
    #[arg(long)]
    pub title: Option<String>,

    /// Level of every message sent (e.g. "warning").
    #[arg(long, value_parser = parse_level, default_value = "information")]
    pub level: Level,

    /// Property attached to every message, as `key=value`. Repeatable.
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Records per flush.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub batch_size: Option<usize>,

    /// Flush period (e.g. "5s").
    #[arg(long, value_parser = parse_duration)]
    pub period: Option<Duration>,

    /// Leave the Properties section out of cards.
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_properties: bool,

    /// Print cards as JSON on stdout instead of posting them.
    #[arg(long, action = ArgAction::SetTrue)]
    pub dry_run: bool,

    /// JSON log output (`--features json-logs`).
    #[arg(long, action = ArgAction::SetTrue)]
    pub json_logs: bool,

    /// Explicit log filter (e.g. "teams_sink=debug").
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_level(raw: &str) -> Result<Level, String> {
    raw.parse()
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}
