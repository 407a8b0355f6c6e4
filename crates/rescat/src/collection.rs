//! Resource collections and the operations that query them.
//!
//! A [`ResourceCollection`] is an ordered sequence of resources with unique
//! names. Collections are values: [`filter`](ResourceCollection::filter),
//! [`with_tags`](ResourceCollection::with_tags) and
//! [`sorted_by`](ResourceCollection::sorted_by) return new collections and
//! leave the receiver untouched.
//!
//! [`select`](ResourceCollection::select) projects a collection into a
//! [`Table`] by evaluating one expression per column.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{Error, Result};
use crate::expr::{Expression, MissingPolicy};
use crate::resource::{is_comment_key, Resource, NAME, TAGS};
use crate::tags::TagSet;
use crate::value::Value;

/// A filter predicate.
///
/// Expression predicates are evaluated with [`MissingPolicy::Default`] and
/// decide by truthiness. Function predicates see the whole resource.
pub enum Predicate<'p> {
    Source(&'p str),
    Compiled(&'p Expression),
    Function(Box<dyn Fn(&Resource) -> bool + 'p>),
}

impl<'p> Predicate<'p> {
    /// Wraps a closure as a predicate.
    pub fn function(f: impl Fn(&Resource) -> bool + 'p) -> Self {
        Predicate::Function(Box::new(f))
    }
}

impl<'p> From<&'p str> for Predicate<'p> {
    fn from(source: &'p str) -> Self {
        Predicate::Source(source)
    }
}

impl<'p> From<&'p String> for Predicate<'p> {
    fn from(source: &'p String) -> Self {
        Predicate::Source(source)
    }
}

impl<'p> From<&'p Expression> for Predicate<'p> {
    fn from(expression: &'p Expression) -> Self {
        Predicate::Compiled(expression)
    }
}

impl fmt::Debug for Predicate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Source(s) => f.debug_tuple("Source").field(s).finish(),
            Predicate::Compiled(e) => f.debug_tuple("Compiled").field(&e.source()).finish(),
            Predicate::Function(_) => f.write_str("Function(<fn>)"),
        }
    }
}

static NAMED_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][\w-]*)\s*:(.*)$").expect("field pattern is valid")
});

/// One column of a [`select`](ResourceCollection::select): a column name
/// and the expression computing it.
///
/// Parsed from either a bare expression, whose text (trimmed) becomes the
/// column name, or `name: expression`.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    name: String,
    expression: Expression,
}

impl FieldSpec {
    pub fn parse(text: &str) -> Result<Self> {
        match NAMED_FIELD.captures(text) {
            Some(caps) => Self::named(&caps[1], &caps[2]),
            None => {
                let source = text.trim();
                Self::named(source, source)
            }
        }
    }

    /// A field with an explicit column name.
    pub fn named(name: &str, expression: &str) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            expression: Expression::parse(expression.trim())?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }
}

impl FromStr for FieldSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FieldSpec::parse(s)
    }
}

/// One row of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    resource: String,
    values: Vec<Value>,
}

impl Row {
    /// Name of the resource this row was computed from.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// Result of [`ResourceCollection::select`].
///
/// Serializes as an array of objects keyed by column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// All values of one column, or `None` if there is no such column.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row.values[idx]).collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowObject {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

struct RowObject<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(&self.row.values) {
            map.serialize_entry(column, &value.to_json())?;
        }
        map.end()
    }
}

/// An ordered collection of uniquely named resources.
///
/// # Example
///
/// ```
/// use rescat::{MissingPolicy, Resource, ResourceCollection, Value};
///
/// let collection = ResourceCollection::new([
///     Resource::new("a").with("k", 1).with_tags(["x"]),
///     Resource::new("b").with_tags(["y"]),
/// ])
/// .unwrap();
///
/// let tagged = collection.filter("tags.x").unwrap();
/// assert_eq!(tagged.names(), vec!["a"]);
///
/// let ks = collection.select_series("k", MissingPolicy::Default).unwrap();
/// assert_eq!(ks, vec![Value::from(1), Value::Null]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResourceCollection {
    resources: Vec<Resource>,
    index: HashMap<String, usize>,
    origin: Option<String>,
}

impl ResourceCollection {
    /// Builds a collection, failing on the first repeated name.
    pub fn new<I>(resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = Resource>,
    {
        let mut collection = Self::default();
        for resource in resources {
            collection.push(resource)?;
        }
        Ok(collection)
    }

    /// Records where the collection was loaded from.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Location the collection was loaded from, without fragment.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Appends a resource.
    ///
    /// Fails on a repeated name, or a name starting with `#`, which the
    /// JSON form would read back as a comment.
    pub fn push(&mut self, resource: Resource) -> Result<()> {
        if is_comment_key(resource.name()) {
            return Err(Error::CommentKey(resource.name().to_string()));
        }
        if self.index.contains_key(resource.name()) {
            return Err(Error::DuplicateName(resource.name().to_string()));
        }
        self.index
            .insert(resource.name().to_string(), self.resources.len());
        self.resources.push(resource);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Looks up a resource by name.
    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.index.get(name).map(|&idx| &self.resources[idx])
    }

    /// Looks up a resource by position.
    pub fn get_index(&self, idx: usize) -> Option<&Resource> {
        self.resources.get(idx)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.resources.iter()
    }

    /// Mutable iteration for transforms. Names cannot change through
    /// [`Resource::set`], so the name index stays valid.
    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, Resource> {
        self.resources.iter_mut()
    }

    pub fn names(&self) -> Vec<&str> {
        self.resources.iter().map(Resource::name).collect()
    }

    /// The only resource, or [`Error::NotSingleton`].
    pub fn singleton(&self) -> Result<&Resource> {
        match self.resources.as_slice() {
            [only] => Ok(only),
            other => Err(Error::NotSingleton(other.len())),
        }
    }

    /// Union of every resource's tags.
    pub fn tags(&self) -> TagSet {
        self.resources
            .iter()
            .filter_map(Resource::tags)
            .fold(TagSet::default(), |acc, tags| acc.union(tags))
    }

    /// Union of attribute names: `name` and `tags` first, the rest sorted.
    pub fn fields(&self) -> Vec<String> {
        let all: BTreeSet<&str> = self
            .resources
            .iter()
            .flat_map(|r| r.keys())
            .filter(|k| *k != NAME && *k != TAGS)
            .collect();
        let mut fields = vec![NAME.to_string()];
        if self.resources.iter().any(|r| r.contains_key(TAGS)) {
            fields.push(TAGS.to_string());
        }
        fields.extend(all.into_iter().map(String::from));
        fields
    }

    /// Resources for which `predicate` holds, in their original order.
    pub fn filter<'p>(&self, predicate: impl Into<Predicate<'p>>) -> Result<Self> {
        let predicate = predicate.into();
        let parsed;
        let expression = match &predicate {
            Predicate::Source(source) => {
                parsed = Expression::parse(source)?;
                Some(&parsed)
            }
            Predicate::Compiled(expression) => Some(*expression),
            Predicate::Function(_) => None,
        };

        let mut kept = Vec::new();
        for resource in &self.resources {
            let keep = match (&predicate, expression) {
                (Predicate::Function(f), _) => f(resource),
                (_, Some(expression)) => expression.matches(resource)?,
                (_, None) => true,
            };
            if keep {
                kept.push(resource.clone());
            }
        }
        Ok(self.derive(kept))
    }

    /// Resources carrying any of the positive tags, or lacking any of the
    /// tags prefixed with `-`. An empty list keeps everything.
    pub fn with_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<Self> {
        if tags.is_empty() {
            return Ok(self.clone());
        }
        let mut wanted = Vec::new();
        let mut unwanted = Vec::new();
        for tag in tags {
            let tag = tag.as_ref();
            let (list, bare) = match tag.strip_prefix('-') {
                Some(bare) => (&mut unwanted, bare),
                None => (&mut wanted, tag),
            };
            if !crate::tags::is_valid_tag(bare) {
                return Err(Error::InvalidTag(tag.to_string()));
            }
            list.push(bare);
        }
        let kept = self
            .resources
            .iter()
            .filter(|r| {
                wanted.iter().any(|t| r.has_tag(t)) || unwanted.iter().any(|t| !r.has_tag(t))
            })
            .cloned()
            .collect();
        Ok(self.derive(kept))
    }

    /// Stable sort by an expression's value, in [`Value::sort_cmp`] order.
    /// Values of different types group by type and nulls sort last.
    pub fn sorted_by(&self, expression: &str) -> Result<Self> {
        let expression = Expression::parse(expression)?;
        let mut keyed = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            let key = expression
                .evaluate(resource, MissingPolicy::Default)?
                .unwrap_or_default();
            keyed.push((key, resource));
        }
        keyed.sort_by(|(a, _), (b, _)| a.sort_cmp(b));
        let sorted = keyed.into_iter().map(|(_, r)| r.clone()).collect();
        Ok(self.derive(sorted))
    }

    /// Projects the collection into a table, one column per field spec.
    ///
    /// Under [`MissingPolicy::Skip`], a resource for which any field
    /// references an absent attribute contributes no row.
    pub fn select<S: AsRef<str>>(&self, fields: &[S], policy: MissingPolicy) -> Result<Table> {
        let specs = fields
            .iter()
            .map(|f| FieldSpec::parse(f.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.select_specs(&specs, policy)
    }

    /// [`select`](Self::select) with pre-parsed field specs.
    pub fn select_specs(&self, specs: &[FieldSpec], policy: MissingPolicy) -> Result<Table> {
        let mut rows = Vec::with_capacity(self.resources.len());
        'resources: for resource in &self.resources {
            let mut values = Vec::with_capacity(specs.len());
            for spec in specs {
                match spec.expression.evaluate(resource, policy)? {
                    Some(value) => values.push(value),
                    None => continue 'resources,
                }
            }
            rows.push(Row {
                resource: resource.name().to_string(),
                values,
            });
        }
        Ok(Table {
            columns: specs.iter().map(|s| s.name.clone()).collect(),
            rows,
        })
    }

    /// Single-expression select returning the bare values.
    pub fn select_series(&self, expression: &str, policy: MissingPolicy) -> Result<Vec<Value>> {
        let expression = Expression::parse(expression)?;
        let mut values = Vec::with_capacity(self.resources.len());
        for resource in &self.resources {
            if let Some(value) = expression.evaluate(resource, policy)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Multi-line description listing every resource and its attributes.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "ResourceCollection: {} resources from {}",
            self.len(),
            self.origin.as_deref().unwrap_or("<no origin>")
        )];
        for resource in &self.resources {
            lines.push(format!("  {}", resource.name()));
            let mut attributes: Vec<_> = resource.attributes().collect();
            attributes.sort_by(|a, b| a.0.cmp(b.0));
            for (key, value) in attributes {
                lines.push(format!("    {:<20} = {}", key, value));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }

    fn derive(&self, resources: Vec<Resource>) -> Self {
        let index = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name().to_string(), i))
            .collect();
        Self {
            resources,
            index,
            origin: self.origin.clone(),
        }
    }
}

/// Collections are equal when they hold equal resources in the same order.
/// The origin is not compared.
impl PartialEq for ResourceCollection {
    fn eq(&self, other: &Self) -> bool {
        self.resources == other.resources
    }
}

impl<'a> IntoIterator for &'a ResourceCollection {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

impl IntoIterator for ResourceCollection {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.into_iter()
    }
}

impl fmt::Display for ResourceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<ResourceCollection: {} resources", self.len())?;
        match self.resources.as_slice() {
            [] => {}
            [only] => write!(f, ": {}", only.name())?,
            many => {
                for resource in many {
                    write!(f, "\n\t{}", resource.name())?;
                }
            }
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ExpressionError;

    fn sample() -> ResourceCollection {
        ResourceCollection::new([
            Resource::new("a")
                .with("k", 1)
                .with("path", "/d/a.bam")
                .with_tags(["x", "important"]),
            Resource::new("b").with("path", "/d/b.csv").with_tags(["y"]),
            Resource::new("c").with("k", 3).with_tags(["x"]),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_names_fail() {
        let err = ResourceCollection::new([Resource::new("a"), Resource::new("a")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateName(name) if name == "a"));
    }

    #[test]
    fn comment_names_are_rejected() {
        let err = ResourceCollection::new([Resource::new("#1")]).unwrap_err();
        assert!(matches!(err, Error::CommentKey(name) if name == "#1"));
        assert!(ResourceCollection::new([Resource::new("a#1")]).is_ok());
    }

    #[test]
    fn lookup_by_name_and_position() {
        let c = sample();
        assert_eq!(c.get("b").unwrap().name(), "b");
        assert_eq!(c.get_index(2).unwrap().name(), "c");
        assert!(c.get("z").is_none());
        assert!(c.contains("a"));
    }

    #[test]
    fn filter_keeps_order() {
        let c = sample();
        assert_eq!(c.filter("tags.x").unwrap().names(), vec!["a", "c"]);
        assert_eq!(c.filter("k > 0").unwrap().names(), vec!["a", "c"]);
        assert_eq!(c.filter("not k").unwrap().names(), vec!["b"]);
    }

    #[test]
    fn filter_accepts_compiled_and_closures() {
        let c = sample();
        let expr = Expression::parse("path.endswith('.csv')").unwrap();
        assert_eq!(c.filter(&expr).unwrap().names(), vec!["b"]);
        let by_fn = c.filter(Predicate::function(|r| r.name() != "a")).unwrap();
        assert_eq!(by_fn.names(), vec!["b", "c"]);
    }

    #[test]
    fn filter_errors() {
        let c = sample();
        assert!(matches!(
            c.filter("k >"),
            Err(Error::Expression(ExpressionError::Syntax { .. }))
        ));
        assert!(matches!(
            c.filter("path < 1"),
            Err(Error::Expression(ExpressionError::Type(_)))
        ));
    }

    #[test]
    fn filtered_collection_keeps_index_and_origin() {
        let c = sample().with_origin("mem");
        let f = c.filter("tags.x").unwrap();
        assert_eq!(f.get("c").unwrap().name(), "c");
        assert_eq!(f.origin(), Some("mem"));
    }

    #[test]
    fn with_tags_positive_and_negated() {
        let c = sample();
        assert_eq!(c.with_tags(&["y"]).unwrap().names(), vec!["b"]);
        assert_eq!(c.with_tags(&["-x"]).unwrap().names(), vec!["b"]);
        assert_eq!(c.with_tags(&["important", "y"]).unwrap().names(), vec!["a", "b"]);
        assert_eq!(c.with_tags::<&str>(&[]).unwrap().len(), 3);
        assert!(c.with_tags(&["bad tag"]).is_err());
    }

    #[test]
    fn sorted_by_puts_nulls_last() {
        let c = sample();
        assert_eq!(c.sorted_by("-k").unwrap().names(), vec!["c", "a", "b"]);
        assert_eq!(c.sorted_by("name").unwrap().names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn sorted_by_groups_mixed_types() {
        let resources = (0..64).map(|i| {
            let resource = Resource::new(format!("r{:02}", i));
            match i % 3 {
                0 => resource.with("v", format!("s{}", 63 - i)),
                1 => resource.with("v", 63 - i),
                _ => resource,
            }
        });
        let c = ResourceCollection::new(resources).unwrap();
        let sorted = c.sorted_by("v").unwrap();
        assert_eq!(sorted.len(), 64);

        let kinds: Vec<&str> = sorted
            .iter()
            .map(|r| r.lookup("v").map_or("null", Value::type_name))
            .collect();
        let mut grouped = kinds.clone();
        grouped.dedup();
        assert_eq!(grouped, vec!["int", "string", "null"]);

        let ints: Vec<i64> = sorted.iter().filter_map(|r| r.lookup("v")?.as_i64()).collect();
        assert!(ints.windows(2).all(|w| w[0] <= w[1]));
        // Nulls keep their original relative order.
        let nulls: Vec<&str> = sorted
            .iter()
            .filter(|r| !r.contains_key("v"))
            .map(Resource::name)
            .collect();
        assert_eq!(nulls.first(), Some(&"r02"));
        assert!(nulls.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn select_missing_policies() {
        let c = ResourceCollection::new([Resource::new("a").with("k", 1), Resource::new("b")])
            .unwrap();
        assert_eq!(
            c.select_series("k", MissingPolicy::Default).unwrap(),
            vec![Value::from(1), Value::Null]
        );
        assert_eq!(
            c.select_series("k", MissingPolicy::Skip).unwrap(),
            vec![Value::from(1)]
        );
        assert!(matches!(
            c.select_series("k", MissingPolicy::Error),
            Err(Error::Expression(ExpressionError::MissingAttribute(_)))
        ));
    }

    #[test]
    fn select_builds_table() {
        let table = sample()
            .select(&["name", "file: basename(path)", "k * 2"], MissingPolicy::Skip)
            .unwrap();
        assert_eq!(table.columns(), ["name", "file", "k * 2"]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].resource(), "a");
        assert_eq!(
            table.rows()[0].values(),
            [Value::from("a"), Value::from("a.bam"), Value::from(2)]
        );
        assert_eq!(table.column("file").unwrap(), vec![&Value::from("a.bam")]);
        assert!(table.column("nope").is_none());
    }

    #[test]
    fn table_serializes_as_objects() {
        let table = sample().select(&["name", "k"], MissingPolicy::Default).unwrap();
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"name": "a", "k": 1},
                {"name": "b", "k": null},
                {"name": "c", "k": 3},
            ])
        );
    }

    #[test]
    fn field_spec_parsing() {
        let named = FieldSpec::parse("out-file : basename(path)").unwrap();
        assert_eq!(named.name(), "out-file");
        assert_eq!(named.expression().source(), "basename(path)");

        let bare = FieldSpec::parse("  k + 1 ").unwrap();
        assert_eq!(bare.name(), "k + 1");

        let string_first = FieldSpec::parse("'a:b' in path").unwrap();
        assert_eq!(string_first.name(), "'a:b' in path");
    }

    #[test]
    fn singleton_and_unions() {
        let c = sample();
        assert!(matches!(c.singleton(), Err(Error::NotSingleton(3))));
        assert_eq!(c.filter("name == 'b'").unwrap().singleton().unwrap().name(), "b");
        assert_eq!(c.tags(), TagSet::new(["x", "y", "important"]));
        assert_eq!(c.fields(), vec!["name", "tags", "k", "path"]);
    }

    #[test]
    fn display_lists_names() {
        assert_eq!(
            ResourceCollection::default().to_string(),
            "<ResourceCollection: 0 resources>"
        );
        assert_eq!(
            sample().to_string(),
            "<ResourceCollection: 3 resources\n\ta\n\tb\n\tc>"
        );
    }
}
