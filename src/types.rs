use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;

/// Identity of a Rust type taking part in mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        TypeKey {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name, for diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Marker stored for every mappable type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMetadata {
    /// Display name used in error messages
    pub type_name: String,
}

impl TypeMetadata {
    pub fn new(type_name: impl Into<String>) -> Self {
        TypeMetadata {
            type_name: type_name.into(),
        }
    }
}

/// Declared coercion type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// No coercion, the raw JSON value is kept
    Any,
    Bool,
    Number,
    String,
    Date,
    Array,
    Set,
    /// Fixed arity, one type per position
    Tuple(Vec<FieldType>),
    /// Another mappable type
    Mapped(TypeKey),
}

impl FieldType {
    pub fn mapped<T: 'static>() -> Self {
        FieldType::Mapped(TypeKey::of::<T>())
    }

    pub fn mapped_key(&self) -> Option<TypeKey> {
        match self {
            FieldType::Mapped(key) => Some(*key),
            _ => None,
        }
    }
}

/// How numeric coercion treats input that is not a number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberPolicy {
    /// Unparseable input becomes `NaN`
    #[default]
    Lenient,
    /// Unparseable input is a conversion error
    Strict,
}

/// How dates are written into documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `2024-01-31T09:30:00.000Z`
    #[default]
    Rfc3339,
    /// Milliseconds since the Unix epoch
    EpochMillis,
}

/// Configuration for the mapping engines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Policy for numeric coercion of non-numeric input
    pub numbers: NumberPolicy,

    /// Output format for date fields
    pub dates: DateFormat,
}

impl MapperConfig {
    pub fn strict() -> Self {
        MapperConfig {
            numbers: NumberPolicy::Strict,
            ..MapperConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_from_json() {
        let config: MapperConfig =
            serde_json::from_value(json!({"numbers": "strict"})).unwrap();
        assert_eq!(config.numbers, NumberPolicy::Strict);
        assert_eq!(config.dates, DateFormat::Rfc3339);
        assert_eq!(config, MapperConfig::strict());
    }

    #[test]
    fn test_type_key_identity() {
        struct Dog;
        struct Cat;

        assert_eq!(TypeKey::of::<Dog>(), TypeKey::of::<Dog>());
        assert_ne!(TypeKey::of::<Dog>(), TypeKey::of::<Cat>());
        assert!(TypeKey::of::<Dog>().name().ends_with("Dog"));
        assert_eq!(FieldType::mapped::<Dog>().mapped_key(), Some(TypeKey::of::<Dog>()));
    }
}
