use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::User;

/// Pulls a value out of a user record, given the rule's configured arguments
pub type Extractor = Arc<dyn Fn(&User, &[String]) -> Value + Send + Sync>;

/// Named extraction functions that field-map rules may refer to
#[derive(Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Extractor>,
}

impl ExtractorRegistry {
    /// A registry with no extractors at all
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, extractor: F)
    where
        F: Fn(&User, &[String]) -> Value + Send + Sync + 'static,
    {
        self.extractors.insert(name.to_string(), Arc::new(extractor));
    }

    /// Builder-style [`ExtractorRegistry::register`]
    pub fn with<F>(mut self, name: &str, extractor: F) -> Self
    where
        F: Fn(&User, &[String]) -> Value + Send + Sync + 'static,
    {
        self.register(name, extractor);
        self
    }

    pub fn get(&self, name: &str) -> Option<Extractor> {
        self.extractors.get(name).cloned()
    }
}

/// The built-in extractors:
/// - `user_field` / `user_meta`: a named profile field or attribute
/// - `email`, `user_id`, `login`: the corresponding core field
/// - `constant`: the first argument verbatim
impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::empty()
            .with("user_field", user_field)
            .with("user_meta", user_field)
            .with("email", |user, _| Value::from(user.email.clone()))
            .with("user_id", |user, _| Value::from(user.id))
            .with("login", |user, _| Value::from(user.login.clone()))
            .with("constant", |_, args| {
                Value::from(args.first().cloned().unwrap_or_default())
            })
    }
}

impl fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.extractors.keys().collect();
        names.sort();
        f.debug_struct("ExtractorRegistry")
            .field("extractors", &names)
            .finish()
    }
}

fn user_field(user: &User, args: &[String]) -> Value {
    let Some(name) = args.first() else {
        return Value::String(String::new());
    };

    match name.as_str() {
        "user_email" | "email" => Value::from(user.email.clone()),
        "ID" | "id" => Value::from(user.id),
        "user_login" | "login" => Value::from(user.login.clone()),
        other => user
            .attribute(other)
            .cloned()
            .unwrap_or_else(|| Value::String(String::new())),
    }
}
