//! Declaration-time builders handed to [`Mappable::declare`]

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use super::field::{
    after_deserialize_hook, deserialize_hook, serialize_hook, FieldDescriptor, Lens, Resolved,
    Validator,
};
use super::Registry;
use crate::mappable::{Mappable, Object, Typed};
use crate::path::Path;
use crate::property::{FromProperty, IntoProperty, Property};
use crate::types::{FieldType, TypeKey};

/// Collects the field descriptors of `T` while `T::declare` runs
pub struct Fields<T: Mappable> {
    descriptors: Vec<FieldDescriptor>,
    parent: Option<(TypeKey, Lens)>,
    dependencies: Vec<fn(&mut Registry)>,
    _marker: PhantomData<fn() -> T>,
}

pub(crate) struct DeclaredFields {
    pub descriptors: Vec<FieldDescriptor>,
    pub parent: Option<(TypeKey, Lens)>,
    pub dependencies: Vec<fn(&mut Registry)>,
}

impl<T: Mappable> Fields<T> {
    pub(crate) fn new() -> Self {
        Fields {
            descriptors: Vec::new(),
            parent: None,
            dependencies: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Map the struct field reached through `get` / `get_mut` under `name`.
    ///
    /// The document path defaults to `name` and the coercion type is inferred
    /// from the Rust type of the field.
    pub fn field<V>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> FieldBuilder<'_, T>
    where
        V: Typed + IntoProperty + FromProperty + Clone + 'static,
    {
        self.dependencies.push(V::register_into);
        self.declare(FieldDescriptor::new(name, get, get_mut))
    }

    /// Add a prebuilt descriptor, replacing any earlier one with the same name.
    pub fn declare(&mut self, descriptor: FieldDescriptor) -> FieldBuilder<'_, T> {
        let index = match self
            .descriptors
            .iter()
            .position(|existing| existing.name == descriptor.name)
        {
            Some(index) => {
                self.descriptors[index] = descriptor;
                index
            }
            None => {
                self.descriptors.push(descriptor);
                self.descriptors.len() - 1
            }
        };
        FieldBuilder::new(&mut self.descriptors[index])
    }

    /// Inherit every field of the embedded ancestor `P`.
    ///
    /// `T` becomes mappable through `P`'s metadata even when `T` itself is
    /// only registered with [`Registry::register_fields`].
    pub fn inherit<P: Mappable>(&mut self, get: fn(&T) -> &P, get_mut: fn(&mut T) -> &mut P) {
        self.dependencies.push(<P as Typed>::register_into);
        self.parent = Some((TypeKey::of::<P>(), Lens::new(get, get_mut)));
    }

    pub(crate) fn into_declared(self) -> DeclaredFields {
        DeclaredFields {
            descriptors: self.descriptors,
            parent: self.parent,
            dependencies: self.dependencies,
        }
    }
}

/// Fluent configuration of one [`FieldDescriptor`]
pub struct FieldBuilder<'a, T: Mappable> {
    descriptor: &'a mut FieldDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Mappable> FieldBuilder<'a, T> {
    pub fn new(descriptor: &'a mut FieldDescriptor) -> Self {
        FieldBuilder {
            descriptor,
            _marker: PhantomData,
        }
    }

    pub fn path(self, path: &str) -> Self {
        self.descriptor.path = Path::parse(path);
        self
    }

    /// Map the field to several document locations at once.
    pub fn paths<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.descriptor.paths = Some(paths.into_iter().map(|p| Path::parse(p.as_ref())).collect());
        self
    }

    pub fn required(self) -> Self {
        self.descriptor.required = true;
        self
    }

    /// Override the inferred coercion type.
    pub fn of_type(self, field_type: FieldType) -> Self {
        self.descriptor.field_type = field_type;
        self
    }

    pub fn element_type(self, element_type: FieldType) -> Self {
        self.descriptor.element_type = Some(element_type);
        self
    }

    /// Reject documents whose coerced value fails `check`.
    ///
    /// The value is converted to `V` first; an absent or unconvertible value
    /// fails the check.
    pub fn validate<V, F>(self, name: &str, check: F) -> Self
    where
        V: FromProperty,
        F: Fn(&V) -> bool + Send + Sync + 'static,
    {
        self.validate_property(name, move |value| {
            value
                .cloned()
                .and_then(|property| V::from_property(property).ok())
                .is_some_and(|value| check(&value))
        })
    }

    pub fn validate_property<F>(self, name: &str, check: F) -> Self
    where
        F: Fn(Option<&Property>) -> bool + Send + Sync + 'static,
    {
        let name = if name.is_empty() { "anonymous function" } else { name };
        self.descriptor.validate = Some(Validator::new(name, check));
        self
    }

    /// Replace built-in coercion with `hook`.
    pub fn deserialize_with<V, F>(self, hook: F) -> Self
    where
        V: IntoProperty,
        F: Fn(Resolved) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.deserialize_raw(move |raw| Ok(hook(raw)?.into_property()))
    }

    pub fn deserialize_raw<F>(self, hook: F) -> Self
    where
        F: Fn(Resolved) -> anyhow::Result<Option<Property>> + Send + Sync + 'static,
    {
        self.descriptor.deserialize = Some(deserialize_hook(hook));
        self
    }

    /// Replace built-in serialization with `hook`; an undefined value skips it.
    pub fn serialize_with<V, F>(self, hook: F) -> Self
    where
        V: FromProperty,
        F: Fn(V) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.serialize_raw(move |value| match value {
            Some(property) => Ok(Some(hook(V::from_property(property)?)?)),
            None => Ok(None),
        })
    }

    pub fn serialize_raw<F>(self, hook: F) -> Self
    where
        F: Fn(Option<Property>) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.descriptor.serialize = Some(serialize_hook(hook));
        self
    }

    /// Transform the field value before it is serialized. The result's own
    /// type decides how it is written.
    pub fn before_serialize<F>(self, hook: F) -> Self
    where
        F: Fn(Option<Property>) -> anyhow::Result<Option<Property>> + Send + Sync + 'static,
    {
        self.descriptor.before_serialize = Some(Arc::new(hook));
        self
    }

    /// Transform the serialized JSON of the field before it is written.
    pub fn after_serialize<F>(self, hook: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.descriptor.after_serialize = Some(Arc::new(hook));
        self
    }

    /// Recompute the field once every other field of the instance is set.
    pub fn after_deserialize<V, F>(self, hook: F) -> Self
    where
        V: IntoProperty,
        F: Fn(&T, Option<Property>) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.after_deserialize_raw(move |object, value| {
            let instance = object.downcast_ref::<T>().ok_or_else(|| {
                anyhow::anyhow!("expected {}, found {}", T::type_name(), object.object_name())
            })?;
            Ok(hook(instance, value)?.into_property())
        })
    }

    pub fn after_deserialize_raw<F>(self, hook: F) -> Self
    where
        F: Fn(&dyn Object, Option<Property>) -> anyhow::Result<Option<Property>>
            + Send
            + Sync
            + 'static,
    {
        self.descriptor.after_deserialize = Some(after_deserialize_hook(hook));
        self
    }
}
