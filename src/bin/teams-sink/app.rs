use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use teams_sink::Result;
use teams_sink::error::{ConfigError, TransportError};
use teams_sink::telemetry::init_tracing;
use teams_sink::transport::{BoxFuture, Transport, WebhookResponse};
use teams_sink::{LogRecord, SinkOptions, TeamsSink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use url::Url;

use super::cli::Cli;

const DEFAULT_CONFIG: &str = "teams-sink.toml";
const DRY_RUN_URL: &str = "http://localhost/dry-run";

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.log_filter.as_deref(), cli.json_logs, None)?;

    let config_path = match cli.config.clone() {
        Some(path) => {
            std::fs::metadata(&path).map_err(|source| ConfigError::FileRead {
                path: path.clone(),
                source,
            })?;
            path
        }
        None => PathBuf::from(DEFAULT_CONFIG),
    };
    let webhook_url = cli
        .webhook_url
        .as_deref()
        .or_else(|| cli.dry_run.then_some(DRY_RUN_URL));
    let mut options = SinkOptions::from_sources(&config_path, webhook_url)?;

    if let Some(title) = cli.title.clone() {
        options = options.with_title(title);
    }
    if let Some(limit) = cli.batch_size {
        options = options.with_batch_size_limit(limit);
    }
    if let Some(period) = cli.period {
        options = options.with_period(period);
    }
    if cli.no_properties {
        options = options.with_render_properties(false);
    }
    if cli.dry_run {
        options = options.with_transport(Arc::new(DryRunTransport));
    }

    let failed = Arc::new(AtomicUsize::new(0));
    let failed_hook = Arc::clone(&failed);
    options = options.on_batch_failure(move |failure| {
        failed_hook.fetch_add(failure.failed(), Ordering::Relaxed);
    });

    let sink = TeamsSink::start(options)?;
    let emitted = if cli.messages.is_empty() {
        forward_stdin(&sink, &cli).await
    } else {
        for message in &cli.messages {
            sink.emit(record(&cli, message));
        }
        cli.messages.len()
    };

    sink.close().await;
    let failed = failed.load(Ordering::Relaxed);
    if failed > 0 {
        warn!(emitted, failed, "some messages were not delivered");
    } else {
        info!(emitted, "all messages delivered");
    }
    Ok(())
}

/// Emits one record per non-blank stdin line until EOF or Ctrl-C.
async fn forward_stdin(sink: &TeamsSink, cli: &Cli) -> usize {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut emitted = 0;
    loop {
        tokio::select! {
            biased;
            _ = signal::ctrl_c() => {
                info!("interrupt received, closing sink");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    sink.emit(record(cli, &line));
                    emitted += 1;
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read stdin, closing sink");
                    break;
                }
            }
        }
    }
    emitted
}

fn record(cli: &Cli, message: &str) -> LogRecord {
    cli.properties
        .iter()
        .fold(LogRecord::new(cli.level, message), |record, (key, value)| {
            record.with_property(key.as_str(), value.as_str())
        })
}

/// Prints each card instead of posting it.
struct DryRunTransport;

impl Transport for DryRunTransport {
    fn post_json<'a>(
        &'a self,
        _url: &'a Url,
        body: Vec<u8>,
    ) -> BoxFuture<'a, std::result::Result<WebhookResponse, TransportError>> {
        Box::pin(async move {
            println!("{}", String::from_utf8_lossy(&body));
            Ok(WebhookResponse {
                status: reqwest::StatusCode::OK,
                body: String::new(),
            })
        })
    }
}
