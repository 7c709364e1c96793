use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::mappable::{Mappable, Object, Typed};
use crate::path::Path;
use crate::property::{ConversionError, FromProperty, IntoProperty, Property};
use crate::types::FieldType;

pub type DeserializeHook = Arc<dyn Fn(Resolved) -> anyhow::Result<Option<Property>> + Send + Sync>;
pub type SerializeHook = Arc<dyn Fn(Option<Property>) -> anyhow::Result<Option<Value>> + Send + Sync>;
pub type BeforeSerializeHook =
    Arc<dyn Fn(Option<Property>) -> anyhow::Result<Option<Property>> + Send + Sync>;
pub type AfterSerializeHook = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;
pub type AfterDeserializeHook =
    Arc<dyn Fn(&dyn Object, Option<Property>) -> anyhow::Result<Option<Property>> + Send + Sync>;

type ReadFn = Arc<dyn Fn(&dyn Object) -> Option<Property> + Send + Sync>;
type WriteFn = Arc<dyn Fn(&mut dyn Object, Property) -> Result<(), ConversionError> + Send + Sync>;
type ProjectFn = Arc<dyn for<'a> Fn(&'a dyn Object) -> Option<&'a dyn Object> + Send + Sync>;
type ProjectMutFn =
    Arc<dyn for<'a> Fn(&'a mut dyn Object) -> Option<&'a mut dyn Object> + Send + Sync>;

pub(crate) fn deserialize_hook<F>(hook: F) -> DeserializeHook
where
    F: Fn(Resolved) -> anyhow::Result<Option<Property>> + Send + Sync + 'static,
{
    Arc::new(hook)
}

pub(crate) fn serialize_hook<F>(hook: F) -> SerializeHook
where
    F: Fn(Option<Property>) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
{
    Arc::new(hook)
}

pub(crate) fn after_deserialize_hook<F>(hook: F) -> AfterDeserializeHook
where
    F: Fn(&dyn Object, Option<Property>) -> anyhow::Result<Option<Property>> + Send + Sync + 'static,
{
    Arc::new(hook)
}

/// Raw value(s) found in the document for one field
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// Value at the single `path`
    Single(Option<Value>),
    /// One entry per `paths` element, in order
    Many(Vec<Option<Value>>),
}

impl Resolved {
    /// True when nothing was found: the single path is absent, or every one
    /// of the multiple paths is.
    pub fn is_missing(&self) -> bool {
        match self {
            Resolved::Single(value) => value.is_none(),
            Resolved::Many(values) => values.iter().all(Option::is_none),
        }
    }

    /// Collapse into the raw value fed to coercion; multiple paths become an
    /// array with `null` in place of absent entries.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Single(value) => value,
            Resolved::Many(values) => Some(Value::Array(
                values
                    .into_iter()
                    .map(|value| value.unwrap_or(Value::Null))
                    .collect(),
            )),
        }
    }
}

/// Reads and writes one struct field through the object-safe view
#[derive(Clone)]
pub struct FieldAccess {
    read: ReadFn,
    write: WriteFn,
}

impl FieldAccess {
    pub fn new<T, V>(get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self
    where
        T: Mappable,
        V: IntoProperty + FromProperty + Clone + 'static,
    {
        FieldAccess::from_fns(
            move |object| {
                object
                    .as_any()
                    .downcast_ref::<T>()
                    .and_then(|target| get(target).clone().into_property())
            },
            move |object, property| {
                let found = object.object_name();
                let target = object
                    .as_any_mut()
                    .downcast_mut::<T>()
                    .ok_or_else(|| ConversionError::new(T::type_name(), found))?;
                *get_mut(target) = V::from_property(property)?;
                Ok(())
            },
        )
    }

    fn from_fns<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&dyn Object) -> Option<Property> + Send + Sync + 'static,
        W: Fn(&mut dyn Object, Property) -> Result<(), ConversionError> + Send + Sync + 'static,
    {
        FieldAccess {
            read: Arc::new(read),
            write: Arc::new(write),
        }
    }

    pub fn read(&self, object: &dyn Object) -> Option<Property> {
        (self.read)(object)
    }

    pub fn write(&self, object: &mut dyn Object, property: Property) -> Result<(), ConversionError> {
        (self.write)(object, property)
    }

    fn project(&self, lens: &Lens) -> FieldAccess {
        let (read, write) = (self.read.clone(), self.write.clone());
        let (get, get_mut) = (lens.get.clone(), lens.get_mut.clone());
        FieldAccess::from_fns(
            move |object| get(object).and_then(|parent| read(parent)),
            move |object, property| {
                let found = object.object_name();
                match get_mut(object) {
                    Some(parent) => write(parent, property),
                    None => Err(ConversionError::new("inheriting type", found)),
                }
            },
        )
    }
}

/// Projection from a type to the ancestor it embeds
#[derive(Clone)]
pub(crate) struct Lens {
    get: ProjectFn,
    get_mut: ProjectMutFn,
}

impl Lens {
    pub(crate) fn new<C: Mappable, P: Mappable>(
        get: fn(&C) -> &P,
        get_mut: fn(&mut C) -> &mut P,
    ) -> Self {
        Lens::from_fns(
            move |object| {
                object
                    .as_any()
                    .downcast_ref::<C>()
                    .map(|child| get(child) as &dyn Object)
            },
            move |object| {
                object
                    .as_any_mut()
                    .downcast_mut::<C>()
                    .map(|child| get_mut(child) as &mut dyn Object)
            },
        )
    }

    fn from_fns<G, M>(get: G, get_mut: M) -> Self
    where
        G: for<'a> Fn(&'a dyn Object) -> Option<&'a dyn Object> + Send + Sync + 'static,
        M: for<'a> Fn(&'a mut dyn Object) -> Option<&'a mut dyn Object> + Send + Sync + 'static,
    {
        Lens {
            get: Arc::new(get),
            get_mut: Arc::new(get_mut),
        }
    }
}

/// Named predicate over a coerced value
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<dyn Fn(Option<&Property>) -> bool + Send + Sync>,
}

impl Validator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(Option<&Property>) -> bool + Send + Sync + 'static,
    {
        Validator {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: Option<&Property>) -> bool {
        (self.check)(value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}

/// Mapping rules for one field of a mappable type
#[derive(Clone)]
pub struct FieldDescriptor {
    pub(crate) name: String,
    pub(crate) path: Path,
    pub(crate) paths: Option<Vec<Path>>,
    pub(crate) required: bool,
    pub(crate) field_type: FieldType,
    pub(crate) element_type: Option<FieldType>,
    pub(crate) validate: Option<Validator>,
    pub(crate) deserialize: Option<DeserializeHook>,
    pub(crate) serialize: Option<SerializeHook>,
    pub(crate) before_serialize: Option<BeforeSerializeHook>,
    pub(crate) after_serialize: Option<AfterSerializeHook>,
    pub(crate) after_deserialize: Option<AfterDeserializeHook>,
    pub(crate) access: FieldAccess,
}

impl FieldDescriptor {
    /// Descriptor for `name` with the path defaulting to the name and the
    /// coercion type inferred from `V`.
    pub fn new<T, V>(name: &str, get: fn(&T) -> &V, get_mut: fn(&mut T) -> &mut V) -> Self
    where
        T: Mappable,
        V: Typed + IntoProperty + FromProperty + Clone + 'static,
    {
        FieldDescriptor {
            name: name.to_string(),
            path: Path::parse(name),
            paths: None,
            required: false,
            field_type: V::field_type(),
            element_type: V::element_type(),
            validate: None,
            deserialize: None,
            serialize: None,
            before_serialize: None,
            after_serialize: None,
            after_deserialize: None,
            access: FieldAccess::new(get, get_mut),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn paths(&self) -> Option<&[Path]> {
        self.paths.as_deref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn element_type(&self) -> Option<&FieldType> {
        self.element_type.as_ref()
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.validate.as_ref()
    }

    pub fn access(&self) -> &FieldAccess {
        &self.access
    }

    /// Path(s) as written in error messages
    pub fn path_label(&self) -> String {
        match &self.paths {
            Some(paths) => paths
                .iter()
                .map(Path::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            None => self.path.to_string(),
        }
    }

    /// Look the field up in `document`.
    pub fn resolve(&self, document: &Value) -> Resolved {
        match &self.paths {
            Some(paths) => Resolved::Many(
                paths
                    .iter()
                    .map(|path| path.get(document).cloned())
                    .collect(),
            ),
            None => Resolved::Single(self.path.get(document).cloned()),
        }
    }

    /// The same rules applied to the ancestor reached through `lens`.
    pub(crate) fn project(&self, lens: &Lens) -> FieldDescriptor {
        let mut projected = self.clone();
        projected.access = self.access.project(lens);
        if let Some(hook) = &self.after_deserialize {
            let hook = hook.clone();
            let get = lens.get.clone();
            projected.after_deserialize = Some(after_deserialize_hook(move |object, value| {
                match get(object) {
                    Some(parent) => hook(parent, value),
                    None => Err(anyhow::anyhow!(
                        "{} does not embed the type declaring this hook",
                        object.object_name()
                    )),
                }
            }));
        }
        projected
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("path", &self.path_label())
            .field("required", &self.required)
            .field("field_type", &self.field_type)
            .field("element_type", &self.element_type)
            .field("validate", &self.validate)
            .field("deserialize", &self.deserialize.is_some())
            .field("serialize", &self.serialize.is_some())
            .finish_non_exhaustive()
    }
}
