//! Relation lifecycle events and relation data.
//!
//! The hosting runtime delivers relation data as a flat string map. Nested
//! values such as `routes` travel JSON-encoded inside it. Events read from
//! JSON lines may carry nested values natively; they are flattened back to
//! the string form on the way in so the reconciler only ever sees one shape.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::RouterError;

/// Flat key/value relation data published by one unit.
pub type RelationData = BTreeMap<String, String>;

/// Relation lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RelationEventKind {
    /// A remote unit joined the relation.
    Joined,
    /// A remote unit changed its relation data.
    Changed,
    /// A remote unit left the relation.
    Departed,
}

impl RelationEventKind {
    /// Returns the event name used by the hosting runtime.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationEventKind::Joined => "relation-joined",
            RelationEventKind::Changed => "relation-changed",
            RelationEventKind::Departed => "relation-departed",
        }
    }
}

impl fmt::Display for RelationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationEventKind {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relation-joined" => Ok(RelationEventKind::Joined),
            "relation-changed" => Ok(RelationEventKind::Changed),
            "relation-departed" => Ok(RelationEventKind::Departed),
            other => Err(RouterError::UnknownEvent {
                event: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for RelationEventKind {
    type Error = RouterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RelationEventKind> for String {
    fn from(kind: RelationEventKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One relation lifecycle event for one remote unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEvent {
    /// The event kind.
    #[serde(rename = "event")]
    pub kind: RelationEventKind,

    /// Relation instance identifier.
    #[serde(default)]
    pub relation_id: u32,

    /// Remote unit name (e.g. "router-requirer/0").
    pub unit: String,

    /// The remote unit's relation data at the time of the event.
    #[serde(default, deserialize_with = "flatten_relation_data")]
    pub data: RelationData,
}

impl RelationEvent {
    /// Creates a new event.
    pub fn new(kind: RelationEventKind, unit: impl Into<String>, data: RelationData) -> Self {
        Self {
            kind,
            relation_id: 0,
            unit: unit.into(),
            data,
        }
    }

    /// Creates a `relation-joined` event.
    pub fn joined(unit: impl Into<String>, data: RelationData) -> Self {
        Self::new(RelationEventKind::Joined, unit, data)
    }

    /// Creates a `relation-changed` event.
    pub fn changed(unit: impl Into<String>, data: RelationData) -> Self {
        Self::new(RelationEventKind::Changed, unit, data)
    }

    /// Creates a `relation-departed` event.
    pub fn departed(unit: impl Into<String>, data: RelationData) -> Self {
        Self::new(RelationEventKind::Departed, unit, data)
    }

    /// Sets the relation identifier.
    pub fn with_relation_id(mut self, relation_id: u32) -> Self {
        self.relation_id = relation_id;
        self
    }
}

/// Accepts string values as-is and JSON-encodes everything else.
fn flatten_relation_data<'de, D>(deserializer: D) -> Result<RelationData, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Value> = BTreeMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let flat = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, flat)
        })
        .collect())
}

/// Helper trait for reading relation data fields.
pub trait RelationDataExt {
    /// Gets the value for a field, treating empty strings as absent.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Checks if a non-empty field exists.
    fn has_field(&self, field: &str) -> bool {
        self.get_field(field).is_some()
    }
}

impl RelationDataExt for RelationData {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.get(field).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Builds a [`RelationData`] map from key-value pairs.
#[macro_export]
macro_rules! relation_data {
    ($($field:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut data = $crate::RelationData::new();
        $(data.insert($field.to_string(), $value.to_string());)*
        data
    }};
}
