//! Batching Microsoft Teams sink for structured logs.
//!
//! Records handed to [`TeamsSink::emit`] are queued and posted, one
//! `MessageCard` per record, to an incoming webhook whenever the batch size
//! limit is reached or the flush period elapses.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod card;
pub mod config;
pub mod error;
pub mod format;
pub mod layer;
pub mod scheduler;
pub mod sink;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use card::{MessageCard, build_card};
pub use config::SinkOptions;
pub use error::{BatchFailure, Error, RecordFailure};
pub use format::{FormatProvider, InvariantFormat, LocaleFormat};
pub use layer::TeamsLayer;
pub use scheduler::SchedulerState;
pub use sink::TeamsSink;
pub use transport::{HttpTransport, Transport};
pub use types::{Level, LogRecord, PropertyValue};

pub type Result<T> = std::result::Result<T, error::Error>;
