//! Types that take part in mapping
//!
//! A struct opts in by implementing [`Mappable`]: it declares its fields once
//! and says how to construct a fresh instance. The engines only ever see the
//! object-safe [`Object`] view, which every `Mappable` gets for free.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::registry::{Fields, Registry};
use crate::types::{FieldType, TypeKey};

/// A struct that can be deserialized from and serialized to JSON documents.
///
/// ```
/// use mold::{Fields, Mappable};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct Dog {
///     name: String,
/// }
///
/// impl Mappable for Dog {
///     fn declare(fields: &mut Fields<Self>) {
///         fields.field("name", |d| &d.name, |d| &mut d.name).required();
///     }
/// }
/// ```
pub trait Mappable: Any + Default + Clone + PartialEq + fmt::Debug + Send + Sync {
    /// Display name stored as the type's metadata
    fn type_name() -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Declare the mapped fields of this type.
    fn declare(fields: &mut Fields<Self>);

    /// Build the instance that deserialization fills in.
    ///
    /// `args` are the extra constructor arguments handed to `deserialize`.
    fn construct(_args: &[Value]) -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Object-safe view of a [`Mappable`] instance
pub trait Object: Any + fmt::Debug + Send + Sync {
    fn type_key(&self) -> TypeKey;
    fn object_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_object(&self) -> Box<dyn Object>;
    fn eq_object(&self, other: &dyn Object) -> bool;
}

impl<T: Mappable> Object for T {
    fn type_key(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn object_name(&self) -> &'static str {
        T::type_name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_object(&self) -> Box<dyn Object> {
        Box::new(self.clone())
    }

    fn eq_object(&self, other: &dyn Object) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

impl dyn Object {
    pub fn is<T: Mappable>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Mappable>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Mappable>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }

    pub fn downcast<T: Mappable>(self: Box<Self>) -> Option<Box<T>> {
        self.into_any().downcast::<T>().ok()
    }
}

impl Clone for Box<dyn Object> {
    fn clone(&self) -> Self {
        self.clone_object()
    }
}

impl PartialEq for dyn Object {
    fn eq(&self, other: &Self) -> bool {
        self.eq_object(other)
    }
}

/// Static type information used to infer a field's coercion type.
pub trait Typed {
    fn field_type() -> FieldType;

    /// Element type of a collection
    fn element_type() -> Option<FieldType> {
        None
    }

    /// Register the mappable types this type refers to.
    fn register_into(_registry: &mut Registry) {}
}

impl<T: Mappable> Typed for T {
    fn field_type() -> FieldType {
        FieldType::Mapped(TypeKey::of::<T>())
    }

    fn register_into(registry: &mut Registry) {
        registry.ensure_registered::<T>();
    }
}

macro_rules! impl_typed {
    ($field_type:expr => $($ty:ty),*) => {$(
        impl Typed for $ty {
            fn field_type() -> FieldType {
                $field_type
            }
        }
    )*};
}

impl_typed!(FieldType::Bool => bool);
impl_typed!(FieldType::Number => f32, f64, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
impl_typed!(FieldType::String => String);
impl_typed!(FieldType::Date => DateTime<Utc>);
impl_typed!(FieldType::Any => Value, crate::property::Property);

impl<V: Typed> Typed for Option<V> {
    fn field_type() -> FieldType {
        V::field_type()
    }

    fn element_type() -> Option<FieldType> {
        V::element_type()
    }

    fn register_into(registry: &mut Registry) {
        V::register_into(registry)
    }
}

macro_rules! impl_typed_collection {
    ($field_type:expr => $($ty:ident),*) => {$(
        impl<V: Typed> Typed for $ty<V> {
            fn field_type() -> FieldType {
                $field_type
            }

            fn element_type() -> Option<FieldType> {
                Some(V::field_type())
            }

            fn register_into(registry: &mut Registry) {
                V::register_into(registry)
            }
        }
    )*};
}

impl_typed_collection!(FieldType::Array => Vec);
impl_typed_collection!(FieldType::Set => HashSet, BTreeSet);

macro_rules! impl_typed_tuple {
    ($($name:ident),+) => {
        impl<$($name: Typed),+> Typed for ($($name,)+) {
            fn field_type() -> FieldType {
                FieldType::Tuple(vec![$($name::field_type()),+])
            }

            fn register_into(registry: &mut Registry) {
                $($name::register_into(registry);)+
            }
        }
    };
}

impl_typed_tuple!(A);
impl_typed_tuple!(A, B);
impl_typed_tuple!(A, B, C);
impl_typed_tuple!(A, B, C, D);
impl_typed_tuple!(A, B, C, D, E);

#[cfg(test)]
mod tests {
    use super::*;

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
    struct Cat;

    impl Mappable for Cat {
        fn type_name() -> &'static str {
            "Kitty"
        }

        fn declare(_fields: &mut Fields<Self>) {}
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Dog::type_name(), "Dog");
        assert_eq!(Cat::type_name(), "Kitty");
        assert_eq!(short_type_name("a::b::Wrapper<a::Dog>"), "Wrapper");
    }

    #[test]
    fn test_object_equality_and_downcast() {
        let scooby: Box<dyn Object> = Box::new(Dog { name: "Scooby".to_string() });
        let copy = scooby.clone();
        let cat: Box<dyn Object> = Box::new(Cat);

        assert!(*scooby == *copy);
        assert!(*scooby != *cat);
        assert!(scooby.is::<Dog>());
        assert_eq!(scooby.downcast_ref::<Dog>().map(|d| d.name.as_str()), Some("Scooby"));
        assert!(cat.downcast::<Dog>().is_none());
    }

    #[test]
    fn test_default_construct_and_registration() {
        let dog = Dog::construct(&[serde_json::json!("ignored")]).unwrap();
        assert_eq!(dog, Dog::default());

        let mut registry = Registry::new();
        <Vec<String>>::register_into(&mut registry);
        assert!(!registry.contains(TypeKey::of::<String>()));
        <Vec<Dog>>::register_into(&mut registry);
        assert!(registry.contains(TypeKey::of::<Dog>()));
    }

    #[test]
    fn test_inferred_field_types() {
        assert_eq!(<Vec<Dog>>::field_type(), FieldType::Array);
        assert_eq!(<Vec<Dog>>::element_type(), Some(FieldType::mapped::<Dog>()));
        assert_eq!(<BTreeSet<String>>::field_type(), FieldType::Set);
        assert_eq!(<Option<f64>>::field_type(), FieldType::Number);
        assert_eq!(
            <(String, f64, Dog)>::field_type(),
            FieldType::Tuple(vec![FieldType::String, FieldType::Number, FieldType::mapped::<Dog>()])
        );
    }
}
