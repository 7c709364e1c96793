use log::{debug, trace};
use serde_json::Value;

use super::Mapper;
use crate::coerce::Coercion;
use crate::error::{MappingError, Result};
use crate::mappable::{Mappable, Object};
use crate::property::Property;
use crate::registry::FieldDescriptor;
use crate::types::TypeKey;

impl<'r> Mapper<'r> {
    /// Build a `T` from `document`.
    ///
    /// `args` are handed to [`Mappable::construct`]. A `Value::String`
    /// document is parsed as JSON text first.
    pub fn deserialize<T: Mappable>(&self, document: Value, args: &[Value]) -> Result<T> {
        let object = self.deserialize_object(document, TypeKey::of::<T>(), args)?;
        object
            .downcast::<T>()
            .map(|instance| *instance)
            .ok_or_else(|| MappingError::NotMappable {
                type_name: T::type_name().to_string(),
            })
    }

    pub fn deserialize_str<T: Mappable>(&self, json: &str, args: &[Value]) -> Result<T> {
        let document: Value = serde_json::from_str(json)?;
        self.deserialize(document, args)
    }

    /// Build an instance of the type identified by `key`.
    pub fn deserialize_object(
        &self,
        document: Value,
        key: TypeKey,
        args: &[Value],
    ) -> Result<Box<dyn Object>> {
        if !self.registry.is_mappable(Some(key)) {
            return Err(MappingError::NotMappable {
                type_name: self.registry.type_name(key),
            });
        }

        let document = match document {
            Value::String(text) => serde_json::from_str(&text)?,
            document => document,
        };

        let type_name = self.registry.type_name(key);
        debug!("deserializing {}", type_name);

        let fields = self.registry.fields_of(key)?;
        let mut instance = self.registry.construct(key, args)?;
        let mut deferred: Vec<(&FieldDescriptor, Option<Property>)> = Vec::new();

        for field in &fields {
            trace!("deserializing {}.{} from '{}'", type_name, field.name, field.path_label());
            let resolved = field.resolve(&document);

            if field.required && resolved.is_missing() {
                return Err(MappingError::RequiredProperty {
                    field: field.name.clone(),
                    path: field.path_label(),
                    type_name,
                    document,
                });
            }

            let coerced = match &field.deserialize {
                Some(hook) => hook(resolved).map_err(|source| MappingError::Hook {
                    type_name: type_name.clone(),
                    field: field.name.clone(),
                    source,
                })?,
                None => Coercion::new(self, &type_name, &field.name).coerce_in(
                    resolved.into_value(),
                    &field.field_type,
                    field.element_type.as_ref(),
                )?,
            };

            if let Some(validator) = &field.validate {
                if !validator.check(coerced.as_ref()) {
                    return Err(MappingError::ValidateProperty {
                        field: field.name.clone(),
                        value: coerced
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "undefined".to_string()),
                        type_name,
                        validator: validator.name().to_string(),
                    });
                }
            }

            if field.after_deserialize.is_some() {
                deferred.push((field, coerced.clone()));
            }
            if let Some(property) = coerced {
                write_field(instance.as_mut(), field, property, &type_name)?;
            }
        }

        for (field, coerced) in deferred {
            let Some(hook) = &field.after_deserialize else {
                continue;
            };
            let recomputed =
                hook(instance.as_ref(), coerced).map_err(|source| MappingError::Hook {
                    type_name: type_name.clone(),
                    field: field.name.clone(),
                    source,
                })?;
            if let Some(property) = recomputed {
                write_field(instance.as_mut(), field, property, &type_name)?;
            }
        }

        Ok(instance)
    }
}

/// A `null` the Rust field cannot hold leaves the field at its constructed value.
fn write_field(
    instance: &mut dyn Object,
    field: &FieldDescriptor,
    property: Property,
    type_name: &str,
) -> Result<()> {
    let is_null = property.is_null();
    match field.access.write(instance, property) {
        Ok(()) => Ok(()),
        Err(_) if is_null => {
            trace!("{}.{} cannot hold null, left unchanged", type_name, field.name);
            Ok(())
        }
        Err(source) => Err(MappingError::Conversion {
            type_name: type_name.to_string(),
            field: field.name.clone(),
            source,
        }),
    }
}
