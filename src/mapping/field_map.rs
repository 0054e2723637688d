use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::domain::{Grouping, ListId, MergeValue, User, GROUPINGS};
use crate::mapping::{coerce, Extractor, ExtractorRegistry, FieldType};

/// Errors raised while compiling field maps from configuration
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("List {list_id}: merge tag {tag} refers to unknown extractor '{function}'")]
    UnknownExtractor {
        list_id: ListId,
        tag: String,
        function: String,
    },
    #[error("List {0}: GROUPINGS must be a sequence of named groups")]
    GroupingsNotSequence(ListId),
    #[error("List {list_id}: only GROUPINGS may hold a sequence of groups, found one under {tag}")]
    UnexpectedSequence { list_id: ListId, tag: String },
}

/// Extraction arguments, either a single value or a sequence
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Args {
    One(String),
    Many(Vec<String>),
}

impl Default for Args {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl From<Args> for Vec<String> {
    fn from(args: Args) -> Self {
        match args {
            Args::One(arg) => vec![arg],
            Args::Many(args) => args,
        }
    }
}

/// Scalar rule: extractor name, positional arguments, optional coercion
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub function: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
}

/// A named group inside the `GROUPINGS` entry
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRule {
    pub name: String,
    pub function: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default, rename = "type")]
    pub field_type: Option<FieldType>,
}

/// One field-map entry as written in configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldMapEntry {
    Groupings(Vec<GroupRule>),
    Field(FieldRule),
}

#[derive(Clone)]
struct CompiledRule {
    extractor: Extractor,
    args: Vec<String>,
    field_type: Option<FieldType>,
}

impl CompiledRule {
    fn apply(&self, user: &User) -> serde_json::Value {
        let value = (self.extractor)(user, &self.args);
        coerce(value, self.field_type)
    }
}

#[derive(Clone)]
enum CompiledEntry {
    Field(CompiledRule),
    Groupings(Vec<(String, CompiledRule)>),
}

/// Resolves merge tags to values for a user, per list
#[derive(Clone, Default)]
pub struct FieldMapper {
    lists: HashMap<ListId, BTreeMap<String, CompiledEntry>>,
}

impl FieldMapper {
    /// Resolve every rule's extractor against the registry.
    /// Tags are normalised to uppercase.
    pub fn compile<'a, I>(lists: I, registry: &ExtractorRegistry) -> Result<Self, MappingError>
    where
        I: IntoIterator<Item = (&'a ListId, &'a BTreeMap<String, FieldMapEntry>)>,
    {
        let mut compiled = HashMap::new();

        for (list_id, field_map) in lists {
            let mut entries = BTreeMap::new();
            for (tag, entry) in field_map {
                let tag = tag.to_uppercase();
                let entry = match (tag == GROUPINGS, entry) {
                    (true, FieldMapEntry::Groupings(groups)) => CompiledEntry::Groupings(
                        groups
                            .iter()
                            .map(|group| {
                                let rule = FieldRule {
                                    function: group.function.clone(),
                                    args: group.args.clone(),
                                    field_type: group.field_type,
                                };
                                compile_rule(list_id, &tag, &rule, registry)
                                    .map(|rule| (group.name.clone(), rule))
                            })
                            .collect::<Result<_, _>>()?,
                    ),
                    (true, FieldMapEntry::Field(_)) => {
                        return Err(MappingError::GroupingsNotSequence(list_id.clone()))
                    }
                    (false, FieldMapEntry::Groupings(_)) => {
                        return Err(MappingError::UnexpectedSequence {
                            list_id: list_id.clone(),
                            tag,
                        })
                    }
                    (false, FieldMapEntry::Field(rule)) => {
                        CompiledEntry::Field(compile_rule(list_id, &tag, rule, registry)?)
                    }
                };
                entries.insert(tag, entry);
            }
            compiled.insert(list_id.clone(), entries);
        }

        Ok(Self { lists: compiled })
    }

    /// Map one merge tag for `user` on `list_id`.
    ///
    /// Unmapped tags yield a neutral value rather than an error. `GROUPINGS`
    /// yields one [`Grouping`] per configured group, in configuration order.
    pub fn map(&self, user: &User, list_id: &ListId, tag: &str) -> MergeValue {
        let tag = tag.to_uppercase();
        let Some(entry) = self.lists.get(list_id).and_then(|map| map.get(&tag)) else {
            return MergeValue::empty_for(&tag);
        };

        match entry {
            CompiledEntry::Field(rule) => MergeValue::Field(rule.apply(user)),
            CompiledEntry::Groupings(groups) => MergeValue::Groupings(
                groups
                    .iter()
                    .map(|(name, rule)| Grouping {
                        name: name.clone(),
                        groups: rule.apply(user),
                    })
                    .collect(),
            ),
        }
    }

    /// Merge tags configured for a list, excluding `GROUPINGS`
    pub fn tags(&self, list_id: &ListId) -> Vec<String> {
        self.lists
            .get(list_id)
            .map(|map| {
                map.keys()
                    .filter(|tag| tag.as_str() != GROUPINGS)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for FieldMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: BTreeMap<_, Vec<_>> = self
            .lists
            .iter()
            .map(|(id, map)| (id, map.keys().collect()))
            .collect();
        f.debug_struct("FieldMapper").field("lists", &tags).finish()
    }
}

fn compile_rule(
    list_id: &ListId,
    tag: &str,
    rule: &FieldRule,
    registry: &ExtractorRegistry,
) -> Result<CompiledRule, MappingError> {
    let extractor = registry
        .get(&rule.function)
        .ok_or_else(|| MappingError::UnknownExtractor {
            list_id: list_id.clone(),
            tag: tag.to_string(),
            function: rule.function.clone(),
        })?;

    Ok(CompiledRule {
        extractor,
        args: rule.args.clone().into(),
        field_type: rule.field_type,
    })
}
