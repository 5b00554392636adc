//! Builds the `MessageCard` JSON document posted for each log record.

use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::format::{FormatProvider, InvariantFormat, render_message};
use crate::types::{Level, LogRecord};

pub const CARD_TYPE: &str = "MessageCard";
pub const CARD_CONTEXT: &str = "http://schema.org/extensions";
pub const PROPERTIES_SECTION: &str = "Properties";

/// Card accent color, derived from the record level.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThemeColor {
    Info,
    Warning,
    Danger,
    Neutral,
}

impl ThemeColor {
    #[must_use]
    pub const fn for_level(level: Level) -> Self {
        match level {
            Level::Information => Self::Info,
            Level::Warning => Self::Warning,
            Level::Error | Level::Fatal => Self::Danger,
            Level::Verbose | Level::Debug | Level::Unknown(_) => Self::Neutral,
        }
    }

    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Info => "5bc0de",
            Self::Warning => "f0ad4e",
            Self::Danger => "d9534f",
            Self::Neutral => "777777",
        }
    }
}

impl Serialize for ThemeColor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.hex())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageCard {
    #[serde(rename = "@type")]
    pub card_type: &'static str,
    #[serde(rename = "@context")]
    pub context: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    #[serde(rename = "themeColor")]
    pub theme_color: ThemeColor,
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    pub facts: Vec<Fact>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Fact {
    pub name: String,
    pub value: String,
}

impl Fact {
    fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The subset of sink options the card builder reads.
#[derive(Clone, Debug)]
pub struct CardOptions {
    pub title: Option<String>,
    pub format_provider: Arc<dyn FormatProvider>,
    pub render_properties: bool,
}

impl Default for CardOptions {
    fn default() -> Self {
        Self {
            title: None,
            format_provider: Arc::new(InvariantFormat),
            render_properties: true,
        }
    }
}

#[must_use]
pub fn build_card(record: &LogRecord, options: &CardOptions) -> MessageCard {
    let provider = options.format_provider.as_ref();
    let sections = if options.render_properties {
        vec![Section {
            title: PROPERTIES_SECTION.to_string(),
            facts: facts(record, provider),
        }]
    } else {
        Vec::new()
    };

    MessageCard {
        card_type: CARD_TYPE,
        context: CARD_CONTEXT,
        title: options.title.clone(),
        text: render_message(record, provider),
        theme_color: ThemeColor::for_level(record.level),
        sections,
    }
}

/// Level, template, optional exception, then each property in record order.
fn facts(record: &LogRecord, provider: &dyn FormatProvider) -> Vec<Fact> {
    let mut facts = Vec::with_capacity(record.properties.len() + 3);
    facts.push(Fact::new("Level", record.level.as_str()));
    facts.push(Fact::new("MessageTemplate", record.template.as_str()));
    if let Some(exception) = record.exception.as_deref() {
        facts.push(Fact::new("Exception", exception));
    }
    for (name, value) in &record.properties {
        facts.push(Fact::new(name.as_str(), provider.format_value(value, None)));
    }
    facts
}

/// Serializes a card to the bytes posted on the wire.
///
/// # Errors
///
/// Returns the serializer error; with the types above this does not happen in practice.
pub fn to_json(card: &MessageCard) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(card)
}
