//! Mapping methods directly on mappable types
//!
//! [`Entity`] works against the process-wide registry and registers the type
//! on first use, so no explicit registration step is needed.

use serde_json::Value;

use crate::error::Result;
use crate::mappable::Mappable;
use crate::mapper::Mapper;
use crate::registry;

pub trait Entity: Mappable {
    fn serialize(&self) -> Result<Value> {
        registry::ensure_registered::<Self>();
        let registry = registry::global();
        Mapper::new(&registry).serialize(self)
    }

    /// Compact JSON text of [`Entity::serialize`]
    fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.serialize()?)?)
    }

    fn deserialize(document: Value) -> Result<Self> {
        Self::deserialize_with(document, &[])
    }

    /// Deserialize with extra arguments for [`Mappable::construct`].
    fn deserialize_with(document: Value, args: &[Value]) -> Result<Self> {
        registry::ensure_registered::<Self>();
        let registry = registry::global();
        Mapper::new(&registry).deserialize(document, args)
    }

    fn from_json_str(json: &str) -> Result<Self> {
        Self::deserialize(serde_json::from_str(json)?)
    }
}

impl<T: Mappable> Entity for T {}
