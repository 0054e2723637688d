use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote-assigned identifier of a mailing list
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListId(String);

impl ListId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a list id from untrusted input, keeping only `[A-Za-z0-9_-]`
    pub fn sanitized(raw: &str) -> Self {
        Self(
            raw.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for ListId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ListId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ListId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A mailing list, as configured locally or as reported by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListInfo {
    pub id: ListId,
    pub name: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "serde_aux::field_attributes::deserialize_option_number_from_string"
    )]
    pub web_id: Option<u64>,
}

/// Lists keyed by their id
pub type ListMap = BTreeMap<ListId, ListInfo>;
