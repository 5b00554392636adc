use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt};

use crate::Result;
use crate::error::Error;
use crate::layer::TeamsLayer;

/// Installs the global subscriber: an `EnvFilter`, a fmt layer and, when
/// given, a [`TeamsLayer`] forwarding events to Teams.
///
/// The filter is the first valid of `explicit_filter`, `RUST_LOG` and `info`.
/// It applies to every layer.
///
/// # Errors
///
/// Returns [`Error::Telemetry`] when JSON output is requested without the
/// `json-logs` feature, or when a global subscriber is already installed.
pub fn init_tracing(
    explicit_filter: Option<&str>,
    use_json: bool,
    teams: Option<TeamsLayer>,
) -> Result<()> {
    let filter = [
        explicit_filter.map(str::to_string),
        std::env::var("RUST_LOG").ok(),
        Some("info".to_string()),
    ]
    .into_iter()
    .flatten()
    .find_map(|candidate| EnvFilter::try_new(candidate).ok())
    .ok_or_else(|| Error::Telemetry("invalid log filter".to_string()))?;

    #[cfg(feature = "json-logs")]
    if use_json {
        let subscriber = Registry::default()
            .with(filter)
            .with(teams)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .json()
                    .flatten_event(true),
            );
        return tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| Error::Telemetry(err.to_string()));
    }

    #[cfg(not(feature = "json-logs"))]
    if use_json {
        return Err(Error::Telemetry(
            "built without the `json-logs` feature".to_string(),
        ));
    }

    let subscriber = Registry::default()
        .with(filter)
        .with(teams)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| Error::Telemetry(err.to_string()))
}
