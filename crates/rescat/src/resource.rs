//! Resources: named, ordered attribute records.
//!
//! A [`Resource`] is an ordered mapping from attribute names to [`Value`]s.
//! Two attributes are special:
//!
//! - `name` is mandatory, always listed first, and cannot be changed or
//!   removed once the resource exists.
//! - `tags`, when present, is always a [`TagSet`].
//!
//! Attribute order is kept for display and serialization. Equality ignores it.

use std::fmt;
use std::ops::Index;

use crate::error::{Error, Result};
use crate::expr::{Expression, MissingPolicy};
use crate::tags::TagSet;
use crate::value::Value;

/// The reserved attribute holding a resource's name.
pub const NAME: &str = "name";

/// The reserved attribute holding a resource's tags.
pub const TAGS: &str = "tags";

/// Leading character of comment keys in the JSON form.
pub(crate) const COMMENT_PREFIX: char = '#';

/// Returns `true` for names that would read back as comments.
pub(crate) fn is_comment_key(key: &str) -> bool {
    key.starts_with(COMMENT_PREFIX)
}

/// A named metadata record.
///
/// # Example
///
/// ```
/// use rescat::{Resource, Value};
///
/// let resource = Resource::new("sample1")
///     .with("path", "/data/sample1.bam")
///     .with("reads", 1200)
///     .with_tags(["tumor", "rna"]);
///
/// assert_eq!(resource.name(), "sample1");
/// assert_eq!(resource.keys(), vec!["name", "path", "reads", "tags"]);
/// assert_eq!(resource["reads"], Value::from(1200));
/// assert!(resource.get("missing").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Resource {
    // Invariant: entry 0 is ("name", Value::String(..)).
    attrs: Vec<(String, Value)>,
}

impl Resource {
    /// Creates a resource with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            attrs: vec![(NAME.to_string(), Value::String(name.into()))],
        }
    }

    /// Builds a resource from a name and ordered attributes.
    ///
    /// A `tags` attribute must be a list of valid tag strings (or already a
    /// tag set). A `name` attribute among `attrs` is rejected.
    pub fn from_attrs<I>(name: impl Into<String>, attrs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut resource = Resource::new(name);
        for (key, value) in attrs {
            resource.set(key, value)?;
        }
        Ok(resource)
    }

    /// Builder-style attribute assignment for literal construction.
    ///
    /// # Panics
    ///
    /// Panics where [`set`](Self::set) would fail: on `name`, on a malformed
    /// `tags` value, and on keys starting with `#`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if let Err(err) = self.set(key.as_str(), value) {
            panic!("cannot set '{}' on resource '{}': {}", key, self.name(), err);
        }
        self
    }

    /// Builder-style tag assignment.
    ///
    /// # Panics
    ///
    /// Panics if a tag is not valid tag syntax.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match TagSet::parse(tags) {
            Ok(tags) => {
                self.put(TAGS.to_string(), Value::Tags(tags));
            }
            Err(err) => panic!("cannot tag resource '{}': {}", self.name(), err),
        }
        self
    }

    pub fn name(&self) -> &str {
        match &self.attrs[0].1 {
            Value::String(name) => name,
            _ => "",
        }
    }

    /// Returns the tag set, if the resource has a `tags` attribute.
    pub fn tags(&self) -> Option<&TagSet> {
        self.lookup(TAGS).and_then(Value::as_tags)
    }

    /// Returns `true` if the resource carries `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().is_some_and(|tags| tags.contains(tag))
    }

    /// Reads an attribute, failing with [`Error::AttributeNotFound`] when it
    /// is absent.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.lookup(key).ok_or_else(|| Error::AttributeNotFound {
            resource: self.name().to_string(),
            attribute: key.to_string(),
        })
    }

    /// Reads an attribute without failing.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Attribute names in order, `name` first.
    pub fn keys(&self) -> Vec<&str> {
        self.attrs.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Iterates over `(name, value)` pairs in order, `name` first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over every attribute except `name`, in order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().skip(1)
    }

    /// Number of attributes, including `name`.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Always `false`: every resource has a name.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Sets an attribute, returning the previous value.
    ///
    /// Existing attributes keep their position; new ones are appended.
    /// A list assigned to `tags` is converted into a [`TagSet`]. Keys
    /// starting with `#`, here or inside nested maps, are rejected.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<Option<Value>> {
        let key = key.into();
        if key == NAME {
            return Err(Error::ReservedAttribute(key));
        }
        if is_comment_key(&key) {
            return Err(Error::CommentKey(key));
        }
        let value = value.into();
        let value = if key == TAGS {
            Value::Tags(coerce_tags(value)?)
        } else {
            check_nested_keys(&value)?;
            value
        };
        Ok(self.put(key, value))
    }

    /// Removes an attribute, returning its value.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>> {
        if key == NAME {
            return Err(Error::ReservedAttribute(key.to_string()));
        }
        Ok(self
            .attrs
            .iter()
            .position(|(k, _)| k == key)
            .map(|pos| self.attrs.remove(pos).1))
    }

    /// Mutable access to the tag set, creating an empty one if needed.
    pub fn tags_mut(&mut self) -> &mut TagSet {
        if !matches!(self.lookup(TAGS), Some(Value::Tags(_))) {
            self.put(TAGS.to_string(), Value::Tags(TagSet::default()));
        }
        match self.attrs.iter_mut().find(|(k, _)| k == TAGS) {
            Some((_, Value::Tags(tags))) => tags,
            _ => unreachable!("tags attribute was just inserted"),
        }
    }

    /// Evaluates an expression against this resource.
    ///
    /// Returns `Ok(None)` when the `skip` policy excluded the resource.
    pub fn evaluate(&self, expression: &str, policy: MissingPolicy) -> Result<Option<Value>> {
        let compiled = Expression::parse(expression)?;
        Ok(compiled.evaluate(self, policy)?)
    }

    fn put(&mut self, key: String, value: Value) -> Option<Value> {
        match self.attrs.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.attrs.push((key, value));
                None
            }
        }
    }
}

fn check_nested_keys(value: &Value) -> Result<()> {
    match value {
        Value::Map(entries) => {
            for (key, value) in entries {
                if is_comment_key(key) {
                    return Err(Error::CommentKey(key.clone()));
                }
                check_nested_keys(value)?;
            }
            Ok(())
        }
        Value::List(items) => items.iter().try_for_each(check_nested_keys),
        _ => Ok(()),
    }
}

/// Converts a value assigned to `tags` into a validated tag set.
fn coerce_tags(value: Value) -> Result<TagSet> {
    match value {
        Value::Tags(tags) => TagSet::parse(tags.iter().cloned()),
        Value::List(items) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => names.push(s),
                    other => return Err(Error::InvalidTags(other.type_name())),
                }
            }
            TagSet::parse(names)
        }
        other => Err(Error::InvalidTags(other.type_name())),
    }
}

impl Index<&str> for Resource {
    type Output = Value;

    /// Panics if the attribute is absent; see [`Resource::get`].
    fn index(&self, key: &str) -> &Value {
        match self.lookup(key) {
            Some(value) => value,
            None => panic!("resource '{}' has no attribute '{}'", self.name(), key),
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.attrs.len() == other.attrs.len()
            && self
                .attrs
                .iter()
                .all(|(k, v)| other.lookup(k).is_some_and(|ov| ov == v))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .attrs
            .iter()
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or(0)
            .min(30);
        write!(f, "<Resource:")?;
        for (i, (key, value)) in self.attrs.iter().enumerate() {
            if i > 0 {
                write!(f, "\n          ")?;
            }
            write!(f, " {:<width$} = {}", key, value, width = width)?;
        }
        write!(f, " >")
    }
}
