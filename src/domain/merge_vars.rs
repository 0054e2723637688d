use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use serde_json::{json, Value};

/// Reserved merge tag carrying interest groupings
pub const GROUPINGS: &str = "GROUPINGS";
/// Merge tag carrying the member's e-mail address
pub const EMAIL: &str = "EMAIL";

/// One named interest grouping and the value of its groups
#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct Grouping {
    pub name: String,
    pub groups: Value,
}

impl From<Grouping> for Value {
    fn from(grouping: Grouping) -> Self {
        json!({ "name": grouping.name, "groups": grouping.groups })
    }
}

/// Result of mapping a single merge tag for a user
#[derive(Debug, Clone, PartialEq)]
pub enum MergeValue {
    Field(Value),
    Groupings(Vec<Grouping>),
}

impl MergeValue {
    /// The value used when a tag has no mapping
    pub fn empty_for(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case(GROUPINGS) {
            Self::Groupings(Vec::new())
        } else {
            Self::Field(Value::String(String::new()))
        }
    }
}

/// Merge-variable payload sent to the remote service.
///
/// Tags are stored uppercase. The payload always serializes a `GROUPINGS`
/// entry, even when no grouping is configured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeVars {
    fields: BTreeMap<String, Value>,
    groupings: Vec<Grouping>,
}

impl MergeVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`MergeVars::set`]
    pub fn with(mut self, tag: &str, value: impl Into<Value>) -> Self {
        self.set(tag, value);
        self
    }

    pub fn set(&mut self, tag: &str, value: impl Into<Value>) {
        self.insert(tag, MergeValue::Field(value.into()));
    }

    pub fn insert(&mut self, tag: &str, value: MergeValue) {
        let tag = tag.to_uppercase();
        match value {
            MergeValue::Groupings(groupings) if tag == GROUPINGS => self.groupings = groupings,
            MergeValue::Groupings(groupings) => {
                let groupings = groupings.into_iter().map(Value::from).collect();
                self.fields.insert(tag, Value::Array(groupings));
            }
            MergeValue::Field(_) if tag == GROUPINGS => {
                tracing::warn!("Ignoring a scalar value for the {} merge tag", GROUPINGS);
            }
            MergeValue::Field(value) => {
                self.fields.insert(tag, value);
            }
        }
    }

    pub fn set_groupings(&mut self, groupings: Vec<Grouping>) {
        self.groupings = groupings;
    }

    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.fields.get(&tag.to_uppercase())
    }

    pub fn groupings(&self) -> &[Grouping] {
        &self.groupings
    }

    /// Number of merge fields, not counting `GROUPINGS`
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for MergeVars {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        for (tag, value) in &self.fields {
            map.serialize_entry(tag, value)?;
        }
        map.serialize_entry(GROUPINGS, &self.groupings)?;
        map.end()
    }
}
