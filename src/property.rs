//! The typed value space produced by coercion
//!
//! Coercion turns raw JSON into a [`Property`], which is then written into a
//! struct field through [`FromProperty`]. Reading a field for serialization
//! goes the other way through [`IntoProperty`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

use crate::mappable::{Mappable, Object};
use crate::types::FieldType;

/// A coerced field value
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Null,
    Bool(bool),
    /// Integral number kept exact
    Integer(i128),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Property>),
    /// Insertion ordered, without duplicates
    Set(Vec<Property>),
    Tuple(Vec<Property>),
    Object(Box<dyn Object>),
    /// Raw JSON kept as is
    Json(Value),
}

impl Property {
    /// Build a [`Property::Set`], dropping duplicates but keeping first-seen order.
    pub fn set_of(items: impl IntoIterator<Item = Property>) -> Self {
        let mut unique: Vec<Property> = Vec::new();
        for item in items {
            if !unique.contains(&item) {
                unique.push(item);
            }
        }
        Property::Set(unique)
    }

    pub fn object<T: Mappable>(value: T) -> Self {
        Property::Object(Box::new(value))
    }

    /// Short name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Property::Null => "null",
            Property::Bool(_) => "boolean",
            Property::Integer(_) | Property::Number(_) => "number",
            Property::String(_) => "string",
            Property::Date(_) => "date",
            Property::Array(_) => "array",
            Property::Set(_) => "set",
            Property::Tuple(_) => "tuple",
            Property::Object(_) => "object",
            Property::Json(value) => json_kind(value),
        }
    }

    /// The coercion type matching what this value actually is.
    pub fn runtime_type(&self) -> FieldType {
        match self {
            Property::Null | Property::Json(_) => FieldType::Any,
            Property::Bool(_) => FieldType::Bool,
            Property::Integer(_) | Property::Number(_) => FieldType::Number,
            Property::String(_) => FieldType::String,
            Property::Date(_) => FieldType::Date,
            Property::Array(_) => FieldType::Array,
            Property::Set(_) => FieldType::Set,
            Property::Tuple(items) => {
                FieldType::Tuple(items.iter().map(Property::runtime_type).collect())
            }
            Property::Object(object) => FieldType::Mapped(object.type_key()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Property::Null | Property::Json(Value::Null))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Property::Bool(b) | Property::Json(Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Property::Integer(i) => Some(*i as f64),
            Property::Number(n) => Some(*n),
            Property::Json(Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    /// Exact integral value; fractional and non-finite numbers have none.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Property::Integer(i) => Some(*i),
            Property::Json(Value::Number(n)) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .or_else(|| n.as_f64().and_then(integral)),
            other => other.as_f64().and_then(integral),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Property::String(s) | Property::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Property::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn as_object<T: Mappable>(&self) -> Option<&T> {
        match self {
            Property::Object(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Elements of any sequence-like value, raw JSON arrays included.
    pub fn into_items(self) -> Option<Vec<Property>> {
        match self {
            Property::Array(items) | Property::Set(items) | Property::Tuple(items) => Some(items),
            Property::Json(Value::Array(items)) => {
                Some(items.into_iter().map(Property::Json).collect())
            }
            _ => None,
        }
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Property::Null => f.write_str("null"),
            Property::Bool(b) => write!(f, "{}", b),
            Property::Integer(i) => write!(f, "{}", i),
            Property::Number(n) => f.write_str(&format_number(*n)),
            Property::String(s) => f.write_str(s),
            Property::Date(date) => f.write_str(&date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Property::Array(items) | Property::Set(items) | Property::Tuple(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Property::Object(object) => write!(f, "{:?}", object),
            Property::Json(value) => write!(f, "{}", value),
        }
    }
}

/// A [`Property`] that does not fit the Rust type it is written into
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ConversionError {
    pub expected: String,
    pub found: String,
}

impl ConversionError {
    pub fn new(expected: impl Into<String>, found: impl Into<String>) -> Self {
        ConversionError {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Conversion out of a coerced [`Property`] into a struct field
pub trait FromProperty: Sized {
    fn from_property(property: Property) -> Result<Self, ConversionError>;
}

/// Conversion of a struct field into a [`Property`]; `None` means "undefined"
/// and leaves the field out of the document.
pub trait IntoProperty {
    fn into_property(self) -> Option<Property>;
}

fn mismatch(expected: &str, property: &Property) -> ConversionError {
    ConversionError::new(expected, property.kind())
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shortest decimal form: integral values print without a fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// JSON rendering of a number; integral values become JSON integers and
/// non-finite values become `null`.
pub(crate) fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// JSON rendering of an exact integer; only values beyond `u64` fall back
/// to a float.
pub(crate) fn integer_value(i: i128) -> Value {
    if let Ok(i) = i64::try_from(i) {
        return Value::from(i);
    }
    if let Ok(u) = u64::try_from(i) {
        return Value::from(u);
    }
    number_value(i as f64)
}

fn integral(n: f64) -> Option<i128> {
    let bound = i128::MAX as f64;
    (n.is_finite() && n.fract() == 0.0 && n.abs() < bound).then_some(n as i128)
}

impl FromProperty for Property {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        Ok(property)
    }
}

impl IntoProperty for Property {
    fn into_property(self) -> Option<Property> {
        Some(self)
    }
}

impl FromProperty for bool {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        property.as_bool().ok_or_else(|| mismatch("boolean", &property))
    }
}

impl IntoProperty for bool {
    fn into_property(self) -> Option<Property> {
        Some(Property::Bool(self))
    }
}

impl FromProperty for f64 {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        property.as_f64().ok_or_else(|| mismatch("number", &property))
    }
}

impl IntoProperty for f64 {
    fn into_property(self) -> Option<Property> {
        Some(Property::Number(self))
    }
}

impl FromProperty for f32 {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        f64::from_property(property).map(|n| n as f32)
    }
}

impl IntoProperty for f32 {
    fn into_property(self) -> Option<Property> {
        Some(Property::Number(self as f64))
    }
}

macro_rules! impl_integer_property {
    ($($ty:ty),*) => {$(
        impl FromProperty for $ty {
            fn from_property(property: Property) -> Result<Self, ConversionError> {
                property
                    .as_i128()
                    .and_then(|i| <$ty>::try_from(i).ok())
                    .ok_or_else(|| mismatch(stringify!($ty), &property))
            }
        }

        impl IntoProperty for $ty {
            fn into_property(self) -> Option<Property> {
                Some(Property::Integer(self as i128))
            }
        }
    )*};
}

impl_integer_property!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromProperty for String {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        match property {
            Property::String(s) | Property::Json(Value::String(s)) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl IntoProperty for String {
    fn into_property(self) -> Option<Property> {
        Some(Property::String(self))
    }
}

impl FromProperty for DateTime<Utc> {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        match &property {
            Property::Date(date) => Ok(*date),
            Property::String(s) | Property::Json(Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|date| date.with_timezone(&Utc))
                .map_err(|_| mismatch("date", &property)),
            _ => Err(mismatch("date", &property)),
        }
    }
}

impl IntoProperty for DateTime<Utc> {
    fn into_property(self) -> Option<Property> {
        Some(Property::Date(self))
    }
}

impl FromProperty for Value {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        Ok(match property {
            Property::Null => Value::Null,
            Property::Bool(b) => Value::Bool(b),
            Property::Integer(i) => integer_value(i),
            Property::Number(n) => number_value(n),
            Property::String(s) => Value::String(s),
            Property::Date(date) => Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Property::Array(items) | Property::Set(items) | Property::Tuple(items) => Value::Array(
                items
                    .into_iter()
                    .map(Value::from_property)
                    .collect::<Result<_, _>>()?,
            ),
            Property::Object(_) => return Err(ConversionError::new("JSON value", "mapped object")),
            Property::Json(value) => value,
        })
    }
}

impl IntoProperty for Value {
    fn into_property(self) -> Option<Property> {
        Some(Property::Json(self))
    }
}

impl<V: FromProperty> FromProperty for Option<V> {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        if property.is_null() {
            Ok(None)
        } else {
            V::from_property(property).map(Some)
        }
    }
}

impl<V: IntoProperty> IntoProperty for Option<V> {
    fn into_property(self) -> Option<Property> {
        self.and_then(IntoProperty::into_property)
    }
}

fn items_of(property: Property, expected: &str) -> Result<Vec<Property>, ConversionError> {
    let kind = property.kind();
    property
        .into_items()
        .ok_or_else(|| ConversionError::new(expected, kind))
}

impl<V: FromProperty> FromProperty for Vec<V> {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        items_of(property, "array")?
            .into_iter()
            .map(V::from_property)
            .collect()
    }
}

impl<V: IntoProperty> IntoProperty for Vec<V> {
    fn into_property(self) -> Option<Property> {
        Some(Property::Array(
            self.into_iter()
                .map(|item| item.into_property().unwrap_or(Property::Null))
                .collect(),
        ))
    }
}

impl<V: FromProperty + Eq + Hash> FromProperty for HashSet<V> {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        items_of(property, "set")?
            .into_iter()
            .map(V::from_property)
            .collect()
    }
}

impl<V: IntoProperty> IntoProperty for HashSet<V> {
    fn into_property(self) -> Option<Property> {
        Some(Property::set_of(
            self.into_iter()
                .map(|item| item.into_property().unwrap_or(Property::Null)),
        ))
    }
}

impl<V: FromProperty + Ord> FromProperty for BTreeSet<V> {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        items_of(property, "set")?
            .into_iter()
            .map(V::from_property)
            .collect()
    }
}

impl<V: IntoProperty> IntoProperty for BTreeSet<V> {
    fn into_property(self) -> Option<Property> {
        Some(Property::set_of(
            self.into_iter()
                .map(|item| item.into_property().unwrap_or(Property::Null)),
        ))
    }
}

/// A missing or `null` position the Rust type cannot hold takes its default.
fn tuple_position<V: FromProperty + Default>(item: Option<Property>) -> Result<V, ConversionError> {
    let item = item.unwrap_or(Property::Null);
    if item.is_null() {
        return Ok(V::from_property(item).unwrap_or_default());
    }
    V::from_property(item)
}

macro_rules! impl_tuple_property {
    ($($name:ident),+) => {
        impl<$($name: FromProperty + Default),+> FromProperty for ($($name,)+) {
            fn from_property(property: Property) -> Result<Self, ConversionError> {
                let mut items = items_of(property, "tuple")?.into_iter();
                Ok(($(tuple_position::<$name>(items.next())?,)+))
            }
        }

        impl<$($name: IntoProperty),+> IntoProperty for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_property(self) -> Option<Property> {
                let ($($name,)+) = self;
                Some(Property::Tuple(vec![
                    $($name.into_property().unwrap_or(Property::Null)),+
                ]))
            }
        }
    };
}

impl_tuple_property!(A);
impl_tuple_property!(A, B);
impl_tuple_property!(A, B, C);
impl_tuple_property!(A, B, C, D);
impl_tuple_property!(A, B, C, D, E);

impl<T: Mappable> FromProperty for T {
    fn from_property(property: Property) -> Result<Self, ConversionError> {
        match property {
            Property::Object(object) => {
                let found = object.object_name();
                object
                    .downcast::<T>()
                    .map(|boxed| *boxed)
                    .ok_or_else(|| ConversionError::new(T::type_name(), found))
            }
            other => Err(mismatch(T::type_name(), &other)),
        }
    }
}

impl<T: Mappable> IntoProperty for T {
    fn into_property(self) -> Option<Property> {
        Some(Property::Object(Box::new(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_set_of_drops_duplicates_in_order() {
        let set = Property::set_of(vec![
            Property::String("b".to_string()),
            Property::String("a".to_string()),
            Property::String("b".to_string()),
        ]);
        assert_eq!(
            set,
            Property::Set(vec![
                Property::String("b".to_string()),
                Property::String("a".to_string()),
            ])
        );
    }

    #[test]
    fn test_primitives_accept_raw_json() {
        assert_eq!(f64::from_property(Property::Json(json!(36.6))), Ok(36.6));
        assert_eq!(String::from_property(Property::Json(json!("x"))), Ok("x".to_string()));
        assert_eq!(bool::from_property(Property::Json(json!(true))), Ok(true));
        assert_eq!(
            Vec::<u32>::from_property(Property::Json(json!([1, 2, 3]))),
            Ok(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_integers_reject_fractions_and_nan() {
        assert_eq!(i64::from_property(Property::Number(18.0)), Ok(18));
        assert_eq!(
            i64::from_property(Property::Number(f64::NAN)),
            Err(ConversionError::new("i64", "number"))
        );
        assert!(u8::from_property(Property::Number(2.5)).is_err());
        assert!(u8::from_property(Property::Number(300.0)).is_err());
    }

    #[test]
    fn test_option_maps_null_to_none() {
        assert_eq!(Option::<String>::from_property(Property::Null), Ok(None));
        assert_eq!(Option::<String>::from_property(Property::Json(Value::Null)), Ok(None));
        assert_eq!(None::<String>.into_property(), None);
        assert_eq!(
            Some("x".to_string()).into_property(),
            Some(Property::String("x".to_string()))
        );
    }

    #[test]
    fn test_tuple_conversion_pads_missing_positions() {
        let tuple = <(String, Option<f64>)>::from_property(Property::Tuple(vec![
            Property::String("x".to_string()),
        ]));
        assert_eq!(tuple, Ok(("x".to_string(), None)));

        assert_eq!(
            ("x".to_string(), 2.0).into_property(),
            Some(Property::Tuple(vec![
                Property::String("x".to_string()),
                Property::Number(2.0),
            ]))
        );
    }

    #[test]
    fn test_tuple_null_positions_take_defaults() {
        let tuple = <(String, f64, Option<u8>)>::from_property(Property::Tuple(vec![
            Property::String("x".to_string()),
            Property::Null,
            Property::Null,
        ]));
        assert_eq!(tuple, Ok(("x".to_string(), 0.0, None)));

        let short = <(String, f64)>::from_property(Property::Json(json!(["x"])));
        assert_eq!(short, Ok(("x".to_string(), 0.0)));

        assert!(<(String, f64)>::from_property(Property::Tuple(vec![
            Property::String("x".to_string()),
            Property::String("two".to_string()),
        ]))
        .is_err());
    }

    #[test]
    fn test_large_integers_stay_exact() {
        let id = 9_007_199_254_740_993u64;
        assert_eq!(id.into_property(), Some(Property::Integer(9_007_199_254_740_993)));
        assert_eq!(u64::from_property(Property::Integer(id as i128)), Ok(id));
        assert_eq!(u64::from_property(Property::Json(json!(id))), Ok(id));
        assert_eq!(u64::from_property(Property::Json(json!(u64::MAX))), Ok(u64::MAX));
        assert!(i64::from_property(Property::Integer(i64::MAX as i128 + 1)).is_err());

        assert_eq!(Value::from_property(Property::Integer(id as i128)), Ok(json!(id)));
        assert_eq!(integer_value(-5), json!(-5));
        assert_eq!(integer_value(u64::MAX as i128), json!(u64::MAX));
        assert_eq!(Property::Integer(-12).to_string(), "-12");
    }

    #[test]
    fn test_value_from_property() {
        let date = Utc.with_ymd_and_hms(2024, 1, 31, 9, 30, 0).unwrap();
        let value = Value::from_property(Property::Tuple(vec![
            Property::Number(2.0),
            Property::Number(2.5),
            Property::Date(date),
            Property::Set(vec![Property::Bool(true)]),
        ]))
        .unwrap();
        assert_eq!(value, json!([2, 2.5, "2024-01-31T09:30:00.000Z", [true]]));
    }

    #[test]
    fn test_runtime_type() {
        let tuple = Property::Tuple(vec![Property::String("x".to_string()), Property::Number(1.0)]);
        assert_eq!(
            tuple.runtime_type(),
            FieldType::Tuple(vec![FieldType::String, FieldType::Number])
        );
        assert_eq!(Property::Json(json!({})).runtime_type(), FieldType::Any);
    }

    #[test]
    fn test_number_rendering() {
        assert_eq!(number_value(2.0), json!(2));
        assert_eq!(number_value(36.6), json!(36.6));
        assert_eq!(number_value(f64::NAN), Value::Null);
        assert_eq!(number_value(9_223_372_036_854_775_808.0), json!(9.223372036854776e18));
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(Property::Number(14.0).to_string(), "14");
    }
}
