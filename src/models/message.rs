use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Freshly extracted observation.
    Live,
    /// Last known observation, published because live data is unavailable or old.
    Stale,
    /// Explicit notice that nothing could be fetched and nothing is stored.
    NoData,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Live => "live",
            MessageKind::Stale => "stale",
            MessageKind::NoData => "no_data",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// Platform-neutral rich message produced by the formatter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub title: String,
    pub description: String,
    pub fields: Vec<EmbedField>,
    pub map_link_url: Option<String>,
    pub closing: Option<String>,
    pub color: u32,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_stale(&self) -> bool {
        self.kind == MessageKind::Stale
    }

    pub fn field(&self, name: &str) -> Option<&EmbedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
