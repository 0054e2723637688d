use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-assigned numeric user identifier
pub type UserId = i64;

/// A user record owned by the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub email: String,
    /// Arbitrary profile attributes, addressable by name
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl User {
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

/// Anything that can be resolved to a concrete [`User`]
#[derive(Debug, Clone, PartialEq)]
pub enum UserRef {
    Id(UserId),
    Email(String),
    User(User),
}

impl From<UserId> for UserRef {
    fn from(id: UserId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for UserRef {
    fn from(email: &str) -> Self {
        Self::Email(email.to_string())
    }
}

impl From<String> for UserRef {
    fn from(email: String) -> Self {
        Self::Email(email)
    }
}

impl From<User> for UserRef {
    fn from(user: User) -> Self {
        Self::User(user)
    }
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self::User(user.clone())
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "user id {}", id),
            Self::Email(email) => write!(f, "email '{}'", email),
            Self::User(user) => write!(f, "user id {} ({})", user.id, user.email),
        }
    }
}
