//! Declarative merge-tag mapping.
//!
//! Each configured list carries a field map from merge tag to an extraction
//! rule. Rules name an extractor from an [`ExtractorRegistry`] and are
//! resolved once, when the [`FieldMapper`] is compiled from configuration.

mod coerce;
mod extractors;
mod field_map;

pub use coerce::{coerce, FieldType};
pub use extractors::{Extractor, ExtractorRegistry};
pub use field_map::{Args, FieldMapEntry, FieldMapper, FieldRule, GroupRule, MappingError};
