//! JSON form: `{ "<name>": { "<attr>": <value>, ... }, ... }`.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};

use crate::collection::ResourceCollection;
use crate::error::{Error, ParseError, Result};
use crate::resource::{is_comment_key, Resource, NAME};
use crate::value::Value;

/// Writes the collection as pretty-printed JSON keyed by resource name.
pub fn write_json(collection: &ResourceCollection) -> String {
    let mut root = serde_json::Map::with_capacity(collection.len());
    for resource in collection {
        let attrs = resource
            .attributes()
            .map(|(k, v)| (k.to_string(), v.to_json()))
            .collect();
        root.insert(resource.name().to_string(), serde_json::Value::Object(attrs));
    }
    // Serializing an in-memory `serde_json::Value` cannot fail.
    let mut out =
        serde_json::to_string_pretty(&serde_json::Value::Object(root)).unwrap_or_default();
    out.push('\n');
    out
}

/// Reads the JSON form.
///
/// Duplicate top-level names are reported as [`Error::DuplicateName`]
/// instead of being silently merged.
pub fn read_json(text: &str) -> Result<ResourceCollection> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let entries = (&mut deserializer)
        .deserialize_map(TopLevel)
        .map_err(ParseError::from)?;
    deserializer.end().map_err(ParseError::from)?;

    let mut collection = ResourceCollection::default();
    for (name, attrs) in entries {
        if is_comment_key(&name) {
            continue;
        }
        let mut resource = Resource::new(name);
        for (key, value) in attrs {
            if is_comment_key(&key) {
                continue;
            }
            if key == NAME {
                if value.as_str() == Some(resource.name()) {
                    continue;
                }
                return Err(Error::ReservedAttribute(key));
            }
            resource.set(key, strip_comments(Value::from(value)))?;
        }
        collection.push(resource)?;
    }
    Ok(collection)
}

fn strip_comments(value: Value) -> Value {
    match value {
        Value::Map(entries) => Value::Map(
            entries
                .into_iter()
                .filter(|(k, _)| !is_comment_key(k))
                .map(|(k, v)| (k, strip_comments(v)))
                .collect(),
        ),
        Value::List(items) => Value::List(items.into_iter().map(strip_comments).collect()),
        other => other,
    }
}

type Entries = Vec<(String, serde_json::Map<String, serde_json::Value>)>;

/// Visits the top-level object entry by entry so repeated keys survive.
struct TopLevel;

impl<'de> Visitor<'de> for TopLevel {
    type Value = Entries;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an object mapping resource names to attribute objects")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Entries, A::Error> {
        let mut entries = Vec::new();
        while let Some(name) = map.next_key::<String>()? {
            let value: serde_json::Value = map.next_value()?;
            match value {
                serde_json::Value::Object(attrs) => entries.push((name, attrs)),
                _ if is_comment_key(&name) => {}
                other => {
                    return Err(de::Error::custom(format!(
                        "resource '{}' must be an object, not {}",
                        name,
                        json_type(&other)
                    )))
                }
            }
        }
        Ok(entries)
    }
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagSet;

    #[test]
    fn reads_in_order_with_tags() {
        let text = r#"{
            "b": {"path": "/x", "tags": ["t2", "t1"], "n": 2.0},
            "a": {"k": 1}
        }"#;
        let c = read_json(text).unwrap();
        assert_eq!(c.names(), vec!["b", "a"]);
        let b = c.get("b").unwrap();
        assert_eq!(b.keys(), vec!["name", "path", "tags", "n"]);
        assert_eq!(b.tags(), Some(&TagSet::new(["t1", "t2"])));
        assert!(matches!(b["n"], Value::Number(n) if n.is_float()));
    }

    #[test]
    fn duplicate_top_level_names_fail() {
        let err = read_json(r#"{"a": {}, "a": {"k": 1}}"#).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn comment_keys_are_dropped_at_every_level() {
        let text = r##"{
            "#": "collection comment",
            "a": {"#note": "x", "meta": {"#why": 1, "lane": 2}}
        }"##;
        let c = read_json(text).unwrap();
        let a = c.singleton().unwrap();
        assert_eq!(a.keys(), vec!["name", "meta"]);
        assert_eq!(a["meta"], Value::Map(vec![("lane".into(), 2.into())]));
    }

    #[test]
    fn non_object_shapes_are_parse_errors() {
        assert!(matches!(read_json("[1, 2]"), Err(Error::Parse(_))));
        let err = read_json("{\n  \"a\": 3\n}").unwrap_err();
        match err {
            Error::Parse(e) => {
                assert_eq!(e.format, "json");
                assert_eq!(e.line, 2);
                assert!(e.message.contains("must be an object"), "{}", e.message);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_tags_are_rejected() {
        assert!(matches!(
            read_json(r#"{"a": {"tags": "x"}}"#),
            Err(Error::InvalidTags("string"))
        ));
        assert!(matches!(
            read_json(r#"{"a": {"tags": ["a b"]}}"#),
            Err(Error::InvalidTag(_))
        ));
    }

    #[test]
    fn inner_hashes_survive_a_round_trip() {
        let c = ResourceCollection::new([
            Resource::new("a#1").with("k#2", Value::Map(vec![("x#".into(), 1.into())])),
            Resource::new("b").with("note", "# not a key"),
        ])
        .unwrap();
        let back = read_json(&write_json(&c)).unwrap();
        assert_eq!(back, c);
        assert_eq!(back.names(), vec!["a#1", "b"]);
    }

    #[test]
    fn write_is_keyed_by_name() {
        let c = ResourceCollection::new([
            Resource::new("a").with("k", 1).with_tags(["x"]),
            Resource::new("b"),
        ])
        .unwrap();
        let text = write_json(&c);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            parsed,
            serde_json::json!({"a": {"k": 1, "tags": ["x"]}, "b": {}})
        );
        assert!(text.ends_with("}\n"));
    }
}
