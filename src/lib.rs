//! # Mold - declarative object mapping for JSON
//!
//! Maps JSON documents onto Rust structs and back using per-field rules
//! declared once per type: document paths, required flags, validators,
//! coercion types and custom hooks.
//!
//! ## Modules
//!
//! - **path**: lodash-style `get`/`set` over `serde_json::Value`
//! - **registry**: field descriptors and mappable markers per type
//! - **coerce**: conversion between raw JSON and typed field values
//! - **mapper**: the deserialize and serialize engines
//! - **entity**: mapping methods directly on mappable types
//!
//! ## Quick Start
//!
//! ```rust
//! use mold::{registry, Fields, Mappable};
//! use serde_json::json;
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct User {
//!     id: String,
//!     age: u32,
//!     city: String,
//! }
//!
//! impl Mappable for User {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.field("id", |u| &u.id, |u| &mut u.id).required();
//!         fields
//!             .field("age", |u| &u.age, |u| &mut u.age)
//!             .validate("adult", |age: &u32| *age >= 18);
//!         fields
//!             .field("city", |u| &u.city, |u| &mut u.city)
//!             .path("address.city");
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! registry::register::<User>();
//!
//! let user: User = mold::deserialize(
//!     json!({"id": "u-1", "age": "42", "address": {"city": "Oslo"}}),
//!     &[],
//! )?;
//! assert_eq!(user.age, 42);
//! assert_eq!(user.city, "Oslo");
//!
//! let document = mold::serialize(&user)?;
//! assert_eq!(document, json!({"id": "u-1", "age": 42, "address": {"city": "Oslo"}}));
//! # Ok(())
//! # }
//! ```

use serde_json::Value;

pub mod coerce;
pub mod entity;
pub mod error;
pub mod mappable;
pub mod mapper;
pub mod path;
pub mod property;
pub mod registry;
pub mod types;

// Re-export commonly used types for convenience
pub use entity::Entity;
pub use error::{MappingError, Result};
pub use mappable::{Mappable, Object, Typed};
pub use mapper::Mapper;
pub use path::{Path, Segment};
pub use property::{ConversionError, FromProperty, IntoProperty, Property};
pub use registry::{FieldBuilder, FieldDescriptor, Fields, Registry, Resolved, Validator};
pub use types::{DateFormat, FieldType, MapperConfig, NumberPolicy, TypeKey, TypeMetadata};

/// Deserialize `document` into `T` using the process-wide registry.
///
/// `T` must have been registered (see [`registry::register`]).
pub fn deserialize<T: Mappable>(document: Value, args: &[Value]) -> Result<T> {
    let registry = registry::global();
    Mapper::new(&registry).deserialize(document, args)
}

/// Serialize `instance` using the process-wide registry.
pub fn serialize<T: Mappable>(instance: &T) -> Result<Value> {
    let registry = registry::global();
    Mapper::new(&registry).serialize(instance)
}
