//! Path resolution over JSON documents
//!
//! Paths use the familiar lodash `get`/`set` syntax: dot separated keys
//! (`user.address.city`), bracketed indices (`posts[0].title`), numeric dot
//! segments (`posts.0`) and quoted bracket keys for keys that contain dots
//! (`headers["content.type"]`). The empty path addresses the document itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

static SEGMENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[(\d+)\]|\["([^"]*)"\]|\['([^']*)'\]|[^.\[\]]+"#).unwrap()
});

static INDEX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:0|[1-9]\d*)$").unwrap()
});

/// One step of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    fn from_dot(raw: &str) -> Self {
        if INDEX_REGEX.is_match(raw) {
            if let Ok(index) = raw.parse() {
                return Segment::Index(index);
            }
        }
        Segment::Key(raw.to_string())
    }
}

/// A parsed document path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
}

impl Path {
    pub fn parse(raw: &str) -> Self {
        let segments = SEGMENT_REGEX
            .captures_iter(raw)
            .map(|caps| {
                if let Some(index) = caps.get(1) {
                    index
                        .as_str()
                        .parse()
                        .map(Segment::Index)
                        .unwrap_or_else(|_| Segment::Key(index.as_str().to_string()))
                } else if let Some(key) = caps.get(2).or_else(|| caps.get(3)) {
                    Segment::Key(key.as_str().to_string())
                } else {
                    Segment::from_dot(&caps[0])
                }
            })
            .collect();

        Path {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve the path against `document`.
    ///
    /// Missing intermediate segments yield `None`; an explicit JSON `null` at
    /// the end of the path is `Some(&Value::Null)`.
    pub fn get<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(document, |current, segment| match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(index), Value::Array(items)) => items.get(*index),
                (Segment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
                _ => None,
            })
    }

    /// Write `value` at the path, creating whatever containers are missing.
    ///
    /// The container created for a missing step is an array when the next
    /// segment is an index and an object otherwise. Index writes past the end
    /// of an array pad it with `null`.
    pub fn set(&self, document: &mut Value, value: Value) {
        let mut current = document;
        for segment in &self.segments {
            current = slot(current, segment);
        }
        *current = value;
    }
}

/// Return the child of `container` addressed by `segment`, reshaping the
/// container when it cannot hold that segment.
fn slot<'a>(container: &'a mut Value, segment: &Segment) -> &'a mut Value {
    match segment {
        Segment::Index(index) => match container {
            Value::Array(items) => {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[*index]
            }
            Value::Object(map) => map.entry(index.to_string()).or_insert(Value::Null),
            other => {
                *other = Value::Array(Vec::new());
                slot(other, segment)
            }
        },
        Segment::Key(key) => match container {
            Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
            other => {
                *other = Value::Object(Map::new());
                slot(other, segment)
            }
        },
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Path {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Path::parse(s))
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Path::parse(raw)
    }
}

impl From<String> for Path {
    fn from(raw: String) -> Self {
        Path::parse(&raw)
    }
}

/// Resolve `path` against `document`
pub fn get<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    Path::parse(path).get(document)
}

/// Write `value` into `document` at `path`
pub fn set(document: &mut Value, path: &str, value: Value) {
    Path::parse(path).set(document, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_segments() {
        let path = Path::parse(r#"track.artists[0].name"#);
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("track".to_string()),
                Segment::Key("artists".to_string()),
                Segment::Index(0),
                Segment::Key("name".to_string()),
            ]
        );

        let quoted = Path::parse(r#"headers["content.type"]"#);
        assert_eq!(
            quoted.segments(),
            &[
                Segment::Key("headers".to_string()),
                Segment::Key("content.type".to_string()),
            ]
        );

        // Leading zeros are keys, not indices
        let padded = Path::parse("codes.01");
        assert_eq!(padded.segments()[1], Segment::Key("01".to_string()));
        assert_eq!(Path::parse("items.2").segments()[1], Segment::Index(2));
        assert!(Path::parse("").is_root());
    }

    #[test]
    fn test_get_nested() {
        let doc = json!({
            "track": {
                "id": "t1",
                "artists": [{"name": "Nina"}, {"name": "Ray"}],
                "preview_url": null
            }
        });

        assert_eq!(get(&doc, "track.id"), Some(&json!("t1")));
        assert_eq!(get(&doc, "track.artists[1].name"), Some(&json!("Ray")));
        assert_eq!(get(&doc, "track.artists.0.name"), Some(&json!("Nina")));
        assert_eq!(get(&doc, "track.preview_url"), Some(&Value::Null));
        assert_eq!(get(&doc, "track.album.name"), None);
        assert_eq!(get(&doc, "track.artists[5]"), None);
        assert_eq!(get(&doc, "track.id.length"), None);
        assert_eq!(get(&doc, ""), Some(&doc));
    }

    #[test]
    fn test_get_index_on_object() {
        let doc = json!({"codes": {"0": "zero"}});
        assert_eq!(get(&doc, "codes[0]"), Some(&json!("zero")));
    }

    #[test]
    fn test_set_creates_containers() {
        let mut doc = json!({});
        set(&mut doc, "bar.foo", json!(2));
        set(&mut doc, "id", json!("x"));
        set(&mut doc, "list[1].name", json!("second"));

        assert_eq!(
            doc,
            json!({
                "bar": {"foo": 2},
                "id": "x",
                "list": [null, {"name": "second"}]
            })
        );
    }

    #[test]
    fn test_set_pads_sparse_arrays() {
        let mut doc = json!({"items": [1]});
        set(&mut doc, "items[3]", json!(4));
        assert_eq!(doc, json!({"items": [1, null, null, 4]}));
    }

    #[test]
    fn test_set_replaces_scalars_in_the_way() {
        let mut doc = json!({"a": 5});
        set(&mut doc, "a.b", json!(true));
        assert_eq!(doc, json!({"a": {"b": true}}));

        let mut doc = json!(null);
        set(&mut doc, "[0]", json!("first"));
        assert_eq!(doc, json!(["first"]));
    }

    #[test]
    fn test_set_root_replaces_document() {
        let mut doc = json!({"old": true});
        set(&mut doc, "", json!({"new": true}));
        assert_eq!(doc, json!({"new": true}));
    }

    #[test]
    fn test_set_then_get() {
        let path = Path::parse("a.b[2].c");
        let mut doc = Value::Null;
        path.set(&mut doc, json!("deep"));
        assert_eq!(path.get(&doc), Some(&json!("deep")));
        assert_eq!(path.to_string(), "a.b[2].c");
    }
}
