//! Conversion between raw document values and typed [`Property`] values
//!
//! `coerce_in` runs while deserializing, `coerce_out` while serializing. Both
//! recurse into the mapper for nested mappable types.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{MappingError, Result};
use crate::mapper::Mapper;
use crate::property::{
    format_number, integer_value, json_kind, number_value, ConversionError, Property,
};
use crate::types::{DateFormat, FieldType, NumberPolicy};

static NUMBER_PREFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap()
});

/// Coercion of the values of one field
pub(crate) struct Coercion<'a> {
    mapper: &'a Mapper<'a>,
    type_name: &'a str,
    field: &'a str,
}

impl<'a> Coercion<'a> {
    pub(crate) fn new(mapper: &'a Mapper<'a>, type_name: &'a str, field: &'a str) -> Self {
        Coercion {
            mapper,
            type_name,
            field,
        }
    }

    /// Coerce a raw document value into the declared type.
    pub(crate) fn coerce_in(
        &self,
        value: Option<Value>,
        field_type: &FieldType,
        element_type: Option<&FieldType>,
    ) -> Result<Option<Property>> {
        let value = match value {
            None => return Ok(None),
            Some(Value::Null) => return Ok(Some(Property::Null)),
            Some(value) => value,
        };

        let property = match field_type {
            FieldType::Tuple(types) => {
                let mut items = match value {
                    Value::Array(items) => items.into_iter(),
                    _ => Vec::new().into_iter(),
                };
                let mut positions = Vec::with_capacity(types.len());
                for position_type in types {
                    let item = items.next().unwrap_or(Value::Null);
                    positions.push(
                        self.coerce_in(Some(item), position_type, None)?
                            .unwrap_or(Property::Null),
                    );
                }
                Property::Tuple(positions)
            }
            FieldType::Date => Property::Date(self.date_in(value)?),
            FieldType::Array => Property::Array(self.items_in(value, "array", element_type)?),
            FieldType::Set => Property::set_of(self.items_in(value, "set", element_type)?),
            FieldType::Bool => Property::Bool(truthy(&value)),
            FieldType::Number => self.number_in(&value)?,
            FieldType::String => Property::String(string_in(&value)),
            FieldType::Mapped(key) if self.mapper.registry().is_mappable(Some(*key)) => {
                Property::Object(self.mapper.deserialize_object(value, *key, &[])?)
            }
            FieldType::Mapped(_) | FieldType::Any => Property::Json(value),
        };
        Ok(Some(property))
    }

    /// Render a field value into a document value.
    pub(crate) fn coerce_out(
        &self,
        value: Option<Property>,
        field_type: &FieldType,
    ) -> Result<Option<Value>> {
        let Some(property) = value else {
            return Ok(None);
        };

        match field_type {
            FieldType::Tuple(types) => {
                let mut items = property.into_items().unwrap_or_default().into_iter();
                let mut positions = Vec::with_capacity(types.len());
                for position_type in types {
                    let item = items.next().unwrap_or(Property::Null);
                    positions.push(
                        self.coerce_out(Some(item), position_type)?
                            .unwrap_or(Value::Null),
                    );
                }
                Ok(Some(Value::Array(positions)))
            }
            _ => self.render(property).map(Some),
        }
    }

    fn render(&self, property: Property) -> Result<Value> {
        Ok(match property {
            Property::Null => Value::Null,
            Property::Bool(b) => Value::Bool(b),
            Property::Integer(i) => integer_value(i),
            Property::Number(n) => number_value(n),
            Property::String(s) => Value::String(s),
            Property::Date(date) => match self.mapper.config().dates {
                DateFormat::Rfc3339 => {
                    Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
                }
                DateFormat::EpochMillis => Value::from(date.timestamp_millis()),
            },
            Property::Array(items) | Property::Set(items) | Property::Tuple(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.render(item))
                    .collect::<Result<_>>()?,
            ),
            Property::Object(object) => self.mapper.serialize_object(object.as_ref())?,
            Property::Json(value) => value,
        })
    }

    fn items_in(
        &self,
        value: Value,
        expected: &str,
        element_type: Option<&FieldType>,
    ) -> Result<Vec<Property>> {
        let items = match value {
            Value::Array(items) => items,
            other => return Err(self.mismatch(expected, json_kind(&other))),
        };

        let element_key = element_type
            .and_then(FieldType::mapped_key)
            .filter(|key| self.mapper.registry().is_mappable(Some(*key)));

        items
            .into_iter()
            .map(|item| match (element_key, item) {
                (_, Value::Null) => Ok(Property::Null),
                (Some(key), item) => Ok(Property::Object(
                    self.mapper.deserialize_object(item, key, &[])?,
                )),
                (None, item) => Ok(Property::Json(item)),
            })
            .collect()
    }

    /// Integral input stays exact as [`Property::Integer`].
    fn number_in(&self, value: &Value) -> Result<Property> {
        let parsed = match value {
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Some(Property::Integer(i.into())),
                (None, Some(u)) => Some(Property::Integer(u.into())),
                _ => n.as_f64().map(Property::Number),
            },
            Value::Bool(b) => Some(Property::Number(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => match s.trim().parse::<i128>() {
                Ok(i) => Some(Property::Integer(i)),
                Err(_) => parse_number(s).map(Property::Number),
            },
            _ => None,
        };

        match (parsed, self.mapper.config().numbers) {
            (Some(number), _) => Ok(number),
            (None, NumberPolicy::Lenient) => Ok(Property::Number(f64::NAN)),
            (None, NumberPolicy::Strict) => Err(self.mismatch("number", json_kind(value))),
        }
    }

    fn date_in(&self, value: Value) -> Result<DateTime<Utc>> {
        let parsed = match &value {
            Value::Number(n) => n.as_f64().and_then(|millis| from_millis(millis as i64)),
            Value::String(s) => parse_date(s),
            _ => None,
        };
        parsed.ok_or_else(|| self.mismatch("date", json_kind(&value)))
    }

    fn mismatch(&self, expected: &str, found: &str) -> MappingError {
        MappingError::Conversion {
            type_name: self.type_name.to_string(),
            field: self.field.to_string(),
            source: ConversionError::new(expected, found),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Full parse first, then the longest leading numeric prefix.
fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<f64>() {
        return Some(n).filter(|n| !n.is_nan());
    }
    NUMBER_PREFIX_REGEX
        .find(trimmed)
        .and_then(|prefix| prefix.as_str().parse::<f64>().ok())
}

fn string_in(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(string_in).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    if let Some(midnight) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Some(Utc.from_utc_datetime(&midnight));
    }
    raw.parse::<i64>().ok().and_then(from_millis)
}
