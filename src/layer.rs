//! `tracing` integration: forwards events to a [`TeamsSink`].

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::format::{FormatProvider, InvariantFormat};
use crate::sink::TeamsSink;
use crate::types::{Level, LogRecord, PropertyValue};

/// Property carrying the event target.
pub const SOURCE_CONTEXT: &str = "SourceContext";

const IGNORED_TARGETS: &[&str] = &["teams_sink", "reqwest", "hyper", "hyper_util", "h2", "rustls"];

/// A [`Layer`] turning each event into a [`LogRecord`] for a [`TeamsSink`].
///
/// The `message` field becomes the template, an `error` or `exception` field
/// becomes the exception text and every other field becomes a property.
/// Events from the sink's own HTTP stack are skipped.
#[derive(Clone, Debug)]
pub struct TeamsLayer {
    sink: TeamsSink,
}

impl TeamsLayer {
    #[must_use]
    pub const fn new(sink: TeamsSink) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for TeamsLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if is_ignored(target) {
            return;
        }
        let level = Level::from(metadata.level());
        if !self.sink.is_enabled(level) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(level, visitor.message.unwrap_or_default());
        record.exception = visitor.exception;
        record.properties = visitor.properties;
        record.set_property(SOURCE_CONTEXT, target);
        self.sink.emit(record);
    }
}

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|ignored| {
        target
            .strip_prefix(ignored)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    exception: Option<String>,
    properties: Vec<(String, PropertyValue)>,
}

impl RecordVisitor {
    fn push(&mut self, field: &Field, value: PropertyValue) {
        match field.name() {
            "message" => self.message = Some(InvariantFormat.format_value(&value, None)),
            "error" | "exception" => {
                self.exception = Some(InvariantFormat.format_value(&value, None));
            }
            name => self.properties.push((name.to_string(), value)),
        }
    }
}

impl Visit for RecordVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, PropertyValue::Float(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, PropertyValue::Int(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, PropertyValue::UInt(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, PropertyValue::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, PropertyValue::Text(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut text = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            text.push_str("\n ---> ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        self.push(field, PropertyValue::Text(text));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, PropertyValue::Text(format!("{value:?}")));
    }
}
