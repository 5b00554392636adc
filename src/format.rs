//! Locale-aware value formatting and message-template rendering.
//!
//! Templates use named holes: `{Name}`, `{@Name}`, `{$Name}`, `{Name:F2}` or
//! `{Name,10}`. Doubled braces escape a literal brace. A hole naming a property
//! the record does not carry is rendered verbatim.

use std::fmt;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{LogRecord, PropertyValue};

/// Largest decimal count honored by `F<n>`; larger requests use default formatting.
pub const MAX_PRECISION: usize = 255;
/// Largest `{Name,width}` honored; larger holes are rendered verbatim.
pub const MAX_WIDTH: usize = 255;

/// Formats property values for display in a notification.
pub trait FormatProvider: fmt::Debug + Send + Sync {
    fn format_float(&self, value: f64, spec: Option<&str>) -> String;

    fn format_timestamp(&self, value: &DateTime<Utc>, spec: Option<&str>) -> String;

    fn format_value(&self, value: &PropertyValue, spec: Option<&str>) -> String {
        match value {
            PropertyValue::Null => "null".to_string(),
            PropertyValue::Bool(b) => b.to_string(),
            PropertyValue::Int(i) => i.to_string(),
            PropertyValue::UInt(u) => u.to_string(),
            PropertyValue::Float(x) => self.format_float(*x, spec),
            PropertyValue::Text(s) => s.clone(),
            PropertyValue::Timestamp(ts) => self.format_timestamp(ts, spec),
            PropertyValue::Sequence(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| self.format_value(item, spec))
                    .collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

/// Culture-neutral formatting: `.` decimal separator, RFC 3339 timestamps.
#[derive(Clone, Copy, Debug, Default)]
pub struct InvariantFormat;

impl FormatProvider for InvariantFormat {
    fn format_float(&self, value: f64, spec: Option<&str>) -> String {
        fixed_precision(spec).map_or_else(|| value.to_string(), |p| format!("{value:.p$}"))
    }

    fn format_timestamp(&self, value: &DateTime<Utc>, spec: Option<&str>) -> String {
        spec.and_then(|pattern| strftime(value, pattern))
            .unwrap_or_else(|| value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Formatting for a specific locale's conventions.
#[derive(Clone, Debug)]
pub struct LocaleFormat {
    pub decimal_separator: char,
    pub timestamp_format: String,
}

impl Default for LocaleFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}

impl FormatProvider for LocaleFormat {
    fn format_float(&self, value: f64, spec: Option<&str>) -> String {
        let text = InvariantFormat.format_float(value, spec);
        if self.decimal_separator == '.' {
            text
        } else {
            text.replacen('.', &self.decimal_separator.to_string(), 1)
        }
    }

    fn format_timestamp(&self, value: &DateTime<Utc>, spec: Option<&str>) -> String {
        spec.and_then(|pattern| strftime(value, pattern))
            .or_else(|| strftime(value, &self.timestamp_format))
            .unwrap_or_else(|| InvariantFormat.format_timestamp(value, None))
    }
}

/// Formats with a strftime pattern, or `None` when the pattern is empty or invalid.
fn strftime(value: &DateTime<Utc>, pattern: &str) -> Option<String> {
    if pattern.is_empty() {
        return None;
    }
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(value.format_with_items(items.iter()).to_string())
}

/// `F2` / `N3` style specifiers select a fixed number of decimals, up to [`MAX_PRECISION`].
fn fixed_precision(spec: Option<&str>) -> Option<usize> {
    let spec = spec?;
    let mut chars = spec.chars();
    match chars.next() {
        Some('F' | 'f' | 'N' | 'n') => chars
            .as_str()
            .parse()
            .ok()
            .filter(|precision| *precision <= MAX_PRECISION),
        _ => None,
    }
}

/// Renders the record's message template with its property values.
#[must_use]
pub fn render_message(record: &LogRecord, provider: &dyn FormatProvider) -> String {
    let template = record.template.as_str();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let token = &tail[..=close];
        match render_hole(&token[1..close], record, provider) {
            Some(text) => out.push_str(&text),
            None => out.push_str(token),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

fn render_hole(hole: &str, record: &LogRecord, provider: &dyn FormatProvider) -> Option<String> {
    let hole = hole.strip_prefix(['@', '$']).unwrap_or(hole);
    let (head, spec) = match hole.split_once(':') {
        Some((head, spec)) => (head, Some(spec)),
        None => (hole, None),
    };
    let (name, align) = match head.split_once(',') {
        Some((name, align)) => (name, Some(parse_alignment(align)?)),
        None => (head, None),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let value = record.property(name)?;
    let text = provider.format_value(value, spec);
    Some(match align {
        Some((width, true)) => format!("{text:<width$}"),
        Some((width, false)) => format!("{text:>width$}"),
        None => text,
    })
}

/// `,10` pads on the left, `,-10` on the right. Widths above [`MAX_WIDTH`] are rejected.
fn parse_alignment(raw: &str) -> Option<(usize, bool)> {
    let raw = raw.trim();
    let (digits, left) = raw.strip_prefix('-').map_or((raw, false), |d| (d, true));
    let width = digits.parse::<usize>().ok()?;
    (width <= MAX_WIDTH).then_some((width, left))
}
