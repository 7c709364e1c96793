//! Metadata registry
//!
//! Holds, per mappable type, the field descriptors declared by
//! [`Mappable::declare`], the optional [`TypeMetadata`] marker, the link to an
//! embedded ancestor and a constructor. A [`Registry`] is a plain value that
//! can be owned and passed to a [`Mapper`](crate::Mapper); the process-wide
//! instance behind [`global`] serves the crate-level API.
//!
//! Registration is expected to happen at program start, before any mapping.

pub mod builder;
pub mod field;

pub use builder::{FieldBuilder, Fields};
pub use field::{
    AfterDeserializeHook, AfterSerializeHook, BeforeSerializeHook, DeserializeHook, FieldAccess,
    FieldDescriptor, Resolved, SerializeHook, Validator,
};

use log::debug;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{MappingError, Result};
use crate::mappable::{Mappable, Object};
use crate::types::{TypeKey, TypeMetadata};
use field::Lens;

type Constructor = Arc<dyn Fn(&[Value]) -> anyhow::Result<Box<dyn Object>> + Send + Sync>;

struct Parent {
    key: TypeKey,
    lens: Lens,
}

struct TypeEntry {
    display_name: &'static str,
    metadata: Option<TypeMetadata>,
    fields: Vec<FieldDescriptor>,
    parent: Option<Parent>,
    construct: Constructor,
}

impl TypeEntry {
    fn new<T: Mappable>() -> Self {
        TypeEntry {
            display_name: T::type_name(),
            metadata: None,
            fields: Vec::new(),
            parent: None,
            construct: Arc::new(|args: &[Value]| -> anyhow::Result<Box<dyn Object>> {
                Ok(Box::new(T::construct(args)?))
            }),
        }
    }
}

/// Per-type store of field descriptors and mappable markers
#[derive(Default)]
pub struct Registry {
    types: HashMap<TypeKey, TypeEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Declare the fields of `T` and mark it mappable.
    ///
    /// Mappable types referenced by the fields (nested structs, collection
    /// elements, tuple positions, the inherited ancestor) are registered too
    /// unless they already are.
    pub fn register<T: Mappable>(&mut self) -> &mut Self {
        self.register_fields::<T>();
        self.declare_mappable::<T>();
        self
    }

    /// Declare the fields of `T` without marking it mappable; `T` maps only
    /// if an ancestor it inherits from is mappable.
    pub fn register_fields<T: Mappable>(&mut self) -> &mut Self {
        debug!("registering fields of {}", T::type_name());
        self.entry_mut::<T>();

        let mut fields = Fields::<T>::new();
        T::declare(&mut fields);
        let declared = fields.into_declared();

        for descriptor in declared.descriptors {
            self.declare_field::<T>(descriptor);
        }
        if let Some((key, lens)) = declared.parent {
            self.entry_mut::<T>().parent = Some(Parent { key, lens });
        }
        for register in declared.dependencies {
            register(self);
        }
        self
    }

    /// Register `T` unless it is already known.
    pub fn ensure_registered<T: Mappable>(&mut self) -> &mut Self {
        if !self.contains(TypeKey::of::<T>()) {
            self.register::<T>();
        }
        self
    }

    /// Merge `descriptor` into the fields of `T`, replacing any descriptor
    /// with the same name.
    pub fn declare_field<T: Mappable>(&mut self, descriptor: FieldDescriptor) {
        let entry = self.entry_mut::<T>();
        match entry
            .fields
            .iter_mut()
            .find(|existing| existing.name == descriptor.name)
        {
            Some(existing) => *existing = descriptor,
            None => entry.fields.push(descriptor),
        }
    }

    /// Record the [`TypeMetadata`] marker of `T`.
    pub fn declare_mappable<T: Mappable>(&mut self) {
        debug!("declaring {} mappable", T::type_name());
        self.entry_mut::<T>().metadata = Some(TypeMetadata::new(T::type_name()));
    }

    /// Make `C` inherit the fields and metadata of the `P` it embeds.
    pub fn declare_parent<C: Mappable, P: Mappable>(
        &mut self,
        get: fn(&C) -> &P,
        get_mut: fn(&mut C) -> &mut P,
    ) {
        self.entry_mut::<C>().parent = Some(Parent {
            key: TypeKey::of::<P>(),
            lens: Lens::new(get, get_mut),
        });
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.types.contains_key(&key)
    }

    /// Whether `key` carries metadata, directly or through an ancestor.
    pub fn is_mappable(&self, key: Option<TypeKey>) -> bool {
        key.is_some_and(|key| self.metadata(key).is_some())
    }

    /// Metadata of `key` or of its nearest ancestor that has some.
    pub fn metadata(&self, key: TypeKey) -> Option<&TypeMetadata> {
        self.lineage(key)
            .into_iter()
            .rev()
            .find_map(|entry| entry.metadata.as_ref())
    }

    /// Display name for diagnostics
    pub fn type_name(&self, key: TypeKey) -> String {
        match self.types.get(&key) {
            Some(entry) => entry
                .metadata
                .as_ref()
                .map(|metadata| metadata.type_name.clone())
                .unwrap_or_else(|| entry.display_name.to_string()),
            None => key.name().to_string(),
        }
    }

    /// Every field of `key`: inherited fields first, then its own. An own
    /// field replaces an inherited one with the same name in place.
    pub fn fields_of(&self, key: TypeKey) -> Result<Vec<FieldDescriptor>> {
        let mut fields: Vec<FieldDescriptor> = Vec::new();

        for entry in self.lineage(key) {
            if let Some(parent) = &entry.parent {
                fields = fields.iter().map(|field| field.project(&parent.lens)).collect();
            }
            for own in &entry.fields {
                match fields.iter_mut().find(|field| field.name == own.name) {
                    Some(field) => *field = own.clone(),
                    None => fields.push(own.clone()),
                }
            }
        }

        if fields.is_empty() {
            return Err(MappingError::NotFound {
                type_name: self.type_name(key),
            });
        }
        Ok(fields)
    }

    pub(crate) fn construct(&self, key: TypeKey, args: &[Value]) -> Result<Box<dyn Object>> {
        let entry = self.types.get(&key).ok_or_else(|| MappingError::NotMappable {
            type_name: key.name().to_string(),
        })?;
        (entry.construct)(args).map_err(|source| MappingError::Construct {
            type_name: self.type_name(key),
            source,
        })
    }

    /// Entries from the farthest registered ancestor down to `key` itself.
    fn lineage(&self, key: TypeKey) -> Vec<&TypeEntry> {
        let mut lineage: Vec<&TypeEntry> = Vec::new();
        let mut next = Some(key);
        while let Some(key) = next {
            let Some(entry) = self.types.get(&key) else {
                break;
            };
            if lineage.iter().any(|seen| std::ptr::eq(*seen, entry)) {
                break;
            }
            lineage.push(entry);
            next = entry.parent.as_ref().map(|parent| parent.key);
        }
        lineage.reverse();
        lineage
    }

    fn entry_mut<T: Mappable>(&mut self) -> &mut TypeEntry {
        self.types
            .entry(TypeKey::of::<T>())
            .or_insert_with(TypeEntry::new::<T>)
    }
}

static GLOBAL: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(Registry::new()));

/// Shared access to the process-wide registry
pub fn global() -> RwLockReadGuard<'static, Registry> {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive access to the process-wide registry
pub fn global_mut() -> RwLockWriteGuard<'static, Registry> {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner)
}

/// Register `T` in the process-wide registry.
pub fn register<T: Mappable>() {
    global_mut().register::<T>();
}

/// Register `T` in the process-wide registry unless it is already there.
pub fn ensure_registered<T: Mappable>() {
    let known = global().contains(TypeKey::of::<T>());
    if !known {
        global_mut().ensure_registered::<T>();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;
    use crate::types::FieldType;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Dog {
        name: String,
    }

    impl Mappable for Dog {
        fn declare(fields: &mut Fields<Self>) {
            fields.field("name", |d| &d.name, |d| &mut d.name);
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Owner {
        name: String,
        dogs: Vec<Dog>,
    }

    impl Mappable for Owner {
        fn declare(fields: &mut Fields<Self>) {
            fields.field("name", |o| &o.name, |o| &mut o.name);
            fields.field("dogs", |o| &o.dogs, |o| &mut o.dogs);
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Profile {
        id: String,
        role: String,
    }

    impl Mappable for Profile {
        fn declare(fields: &mut Fields<Self>) {
            fields.field("id", |p| &p.id, |p| &mut p.id);
            fields.field("role", |p| &p.role, |p| &mut p.role);
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Manager {
        profile: Profile,
        role: String,
        reports: u32,
    }

    impl Mappable for Manager {
        fn declare(fields: &mut Fields<Self>) {
            fields.inherit(|m| &m.profile, |m| &mut m.profile);
            fields.field("role", |m| &m.role, |m| &mut m.role).path("title");
            fields.field("reports", |m| &m.reports, |m| &mut m.reports);
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Empty;

    impl Mappable for Empty {
        fn declare(_fields: &mut Fields<Self>) {}
    }

    #[test]
    fn test_register_marks_mappable_and_dependencies() {
        let mut registry = Registry::new();
        registry.register::<Owner>();

        assert!(registry.is_mappable(Some(TypeKey::of::<Owner>())));
        assert!(registry.is_mappable(Some(TypeKey::of::<Dog>())));
        assert!(!registry.is_mappable(None));
        assert_eq!(
            registry.metadata(TypeKey::of::<Owner>()),
            Some(&TypeMetadata::new("Owner"))
        );
    }

    #[test]
    fn test_register_fields_alone_is_not_mappable() {
        let mut registry = Registry::new();
        registry.register_fields::<Dog>();

        assert!(registry.contains(TypeKey::of::<Dog>()));
        assert!(!registry.is_mappable(Some(TypeKey::of::<Dog>())));
        assert_eq!(registry.fields_of(TypeKey::of::<Dog>()).unwrap().len(), 1);
    }

    #[test]
    fn test_inherited_fields_and_metadata() {
        let mut registry = Registry::new();
        registry.register_fields::<Manager>();

        let key = TypeKey::of::<Manager>();
        assert!(registry.is_mappable(Some(key)));
        assert_eq!(registry.metadata(key), Some(&TypeMetadata::new("Profile")));
        assert_eq!(registry.type_name(key), "Manager");

        let fields = registry.fields_of(key).unwrap();
        let names: Vec<_> = fields.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["id", "role", "reports"]);
        assert_eq!(fields[1].path().as_str(), "title");

        let mut manager = Manager::default();
        fields[0]
            .access()
            .write(&mut manager, Property::String("p-7".to_string()))
            .unwrap();
        fields[1]
            .access()
            .write(&mut manager, Property::String("lead".to_string()))
            .unwrap();
        assert_eq!(manager.profile.id, "p-7");
        assert_eq!(manager.role, "lead");
        assert_eq!(manager.profile.role, "");
        assert_eq!(
            fields[0].access().read(&manager),
            Some(Property::String("p-7".to_string()))
        );
    }

    #[test]
    fn test_declare_field_replaces_by_name() {
        let mut registry = Registry::new();
        registry.register::<Dog>();

        let mut descriptor =
            FieldDescriptor::new::<Dog, String>("name", |d| &d.name, |d| &mut d.name);
        FieldBuilder::<Dog>::new(&mut descriptor).path("dog_name");
        registry.declare_field::<Dog>(descriptor);

        let fields = registry.fields_of(TypeKey::of::<Dog>()).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path().as_str(), "dog_name");
        assert_eq!(fields[0].field_type(), &FieldType::String);
    }

    #[test]
    fn test_fields_of_without_descriptors() {
        let mut registry = Registry::new();
        registry.register::<Empty>();

        assert!(registry.is_mappable(Some(TypeKey::of::<Empty>())));
        assert!(matches!(
            registry.fields_of(TypeKey::of::<Empty>()),
            Err(MappingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_ensure_registered_keeps_existing_entry() {
        let mut registry = Registry::new();
        registry.register_fields::<Dog>();
        registry.ensure_registered::<Dog>();

        assert!(!registry.is_mappable(Some(TypeKey::of::<Dog>())));
    }
}
