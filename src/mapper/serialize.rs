use log::{debug, trace};
use serde_json::{Map, Value};
use std::borrow::Cow;

use super::Mapper;
use crate::coerce::Coercion;
use crate::error::{MappingError, Result};
use crate::mappable::{Mappable, Object};
use crate::property::Property;
use crate::types::FieldType;

impl<'r> Mapper<'r> {
    /// Render `instance` as a JSON document.
    pub fn serialize<T: Mappable>(&self, instance: &T) -> Result<Value> {
        self.serialize_object(instance)
    }

    pub fn serialize_object(&self, instance: &dyn Object) -> Result<Value> {
        let key = instance.type_key();
        if !self.registry.is_mappable(Some(key)) {
            return Err(MappingError::NotMappable {
                type_name: self.registry.type_name(key),
            });
        }

        let type_name = self.registry.type_name(key);
        debug!("serializing {}", type_name);

        let hook_error = |field: &str, source: anyhow::Error| MappingError::Hook {
            type_name: type_name.clone(),
            field: field.to_string(),
            source,
        };

        let mut document = Value::Object(Map::new());
        for field in self.registry.fields_of(key)? {
            let value = field.access.read(instance);

            let (value, field_type): (Option<Property>, Cow<'_, FieldType>) =
                match &field.before_serialize {
                    Some(hook) => {
                        let value = hook(value).map_err(|source| hook_error(&field.name, source))?;
                        let runtime_type = value
                            .as_ref()
                            .map(Property::runtime_type)
                            .unwrap_or(FieldType::Any);
                        (value, Cow::Owned(runtime_type))
                    }
                    None => (value, Cow::Borrowed(&field.field_type)),
                };

            let serialized = match &field.serialize {
                Some(hook) => hook(value).map_err(|source| hook_error(&field.name, source))?,
                None => Coercion::new(self, &type_name, &field.name).coerce_out(value, &field_type)?,
            };

            let serialized = match (serialized, &field.after_serialize) {
                (Some(serialized), Some(hook)) => {
                    Some(hook(serialized).map_err(|source| hook_error(&field.name, source))?)
                }
                (serialized, _) => serialized,
            };

            let Some(serialized) = serialized else {
                trace!("{}.{} is undefined, skipped", type_name, field.name);
                continue;
            };

            match &field.paths {
                Some(paths) => {
                    let Value::Array(items) = serialized else {
                        return Err(MappingError::FanOut {
                            type_name: type_name.clone(),
                            field: field.name.clone(),
                            paths: paths.len(),
                        });
                    };
                    for (path, item) in paths.iter().zip(items) {
                        trace!("writing {}.{} to '{}'", type_name, field.name, path);
                        path.set(&mut document, item);
                    }
                }
                None => {
                    trace!("writing {}.{} to '{}'", type_name, field.name, field.path);
                    field.path.set(&mut document, serialized);
                }
            }
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Fields, Registry};
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Reading {
        sensor: String,
        celsius: f64,
        note: Option<String>,
        raw: (String, f64),
    }

    impl Mappable for Reading {
        fn declare(fields: &mut Fields<Self>) {
            fields.field("sensor", |r| &r.sensor, |r| &mut r.sensor).path("meta.sensor");
            fields
                .field("celsius", |r| &r.celsius, |r| &mut r.celsius)
                .serialize_with(|celsius: f64| Ok(json!(format!("{}C", celsius))))
                .after_serialize(|value| Ok(json!({ "display": value })));
            fields.field("note", |r| &r.note, |r| &mut r.note);
            fields
                .field("raw", |r| &r.raw, |r| &mut r.raw)
                .paths(["raw.unit", "raw.value"]);
        }
    }

    #[test]
    fn test_serialize_hooks_and_fan_out() {
        let mut registry = Registry::new();
        registry.register::<Reading>();
        let mapper = Mapper::new(&registry);

        let reading = Reading {
            sensor: "s-1".to_string(),
            celsius: 21.5,
            note: None,
            raw: ("mV".to_string(), 431.0),
        };

        let document = mapper.serialize(&reading).unwrap();
        assert_eq!(
            document,
            json!({
                "meta": {"sensor": "s-1"},
                "celsius": {"display": "21.5C"},
                "raw": {"unit": "mV", "value": 431}
            })
        );
    }

    #[test]
    fn test_fan_out_requires_array() {
        #[derive(Debug, Default, Clone, PartialEq)]
        struct Broken {
            name: String,
        }

        impl Mappable for Broken {
            fn declare(fields: &mut Fields<Self>) {
                fields.field("name", |b| &b.name, |b| &mut b.name).paths(["a", "b"]);
            }
        }

        let mut registry = Registry::new();
        registry.register::<Broken>();
        let mapper = Mapper::new(&registry);

        let err = mapper
            .serialize(&Broken {
                name: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, MappingError::FanOut { paths: 2, .. }));
    }

    #[test]
    fn test_unregistered_type_is_not_mappable() {
        let registry = Registry::new();
        let mapper = Mapper::new(&registry);

        let err = mapper.serialize(&Reading::default()).unwrap_err();
        assert!(matches!(err, MappingError::NotMappable { .. }));
    }
}
