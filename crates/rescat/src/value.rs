//! Attribute values.
//!
//! The [`Value`] enum is the dynamic type of every resource attribute and of
//! every expression result. It mirrors the JSON data model, plus one extra
//! variant, [`Value::Tags`], for the reserved `tags` attribute.

use std::cmp::Ordering;
use std::fmt;

use crate::tags::TagSet;

/// A dynamically typed attribute value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent, null, or `None`.
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    /// Ordered sequence.
    List(Vec<Value>),
    /// Nested mapping. Key order is preserved for serialization but ignored
    /// by equality.
    Map(Vec<(String, Value)>),
    /// The value of a resource's `tags` attribute.
    Tags(TagSet),
}

impl Value {
    /// Returns the name of this value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(Number::F64(_)) => "float",
            Value::Number(_) => "int",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Tags(_) => "tags",
        }
    }

    /// Returns `true` if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness: null, `false`, zero, and empty strings/lists/maps/tags
    /// are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.to_f64() != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(entries) => !entries.is_empty(),
            Value::Tags(tags) => !tags.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(Number::I64(n)) => Some(*n),
            Value::Number(Number::U64(n)) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_number().map(Number::to_f64)
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tags(&self) -> Option<&TagSet> {
        match self {
            Value::Tags(tags) => Some(tags),
            _ => None,
        }
    }

    /// Looks up a key in a `Map` value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Orders two values when they are comparable: numbers with numbers,
    /// strings with strings, booleans with booleans, lists lexicographically.
    pub fn partial_compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.compare(*b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_compare(y)? {
                        Ordering::Equal => continue,
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => None,
        }
    }

    /// Total order used for sorting.
    ///
    /// Values of different types order by type: booleans, numbers, strings,
    /// lists, maps, tags, then null. Within a type, numbers compare
    /// numerically with NaN after every other number, lists element by
    /// element, and maps by their entries in key order.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.sort_cmp(*b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => sort_cmp_seq(a.iter(), b.iter()),
            (Value::Map(a), Value::Map(b)) => {
                let mut a: Vec<_> = a.iter().collect();
                let mut b: Vec<_> = b.iter().collect();
                a.sort_by(|x, y| x.0.cmp(&y.0));
                b.sort_by(|x, y| x.0.cmp(&y.0));
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    match ka.cmp(kb).then_with(|| va.sort_cmp(vb)) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Tags(a), Value::Tags(b)) => a.iter().cmp(b.iter()),
            _ => Ordering::Equal,
        })
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::List(_) => 3,
            Value::Map(_) => 4,
            Value::Tags(_) => 5,
            Value::Null => 6,
        }
    }

    /// Converts to a `serde_json::Value`, preserving map key order.
    ///
    /// Tags become an array of strings; non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => n.to_json(),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Tags(tags) => serde_json::Value::Array(
                tags.iter()
                    .map(|t| serde_json::Value::String(t.clone()))
                    .collect(),
            ),
        }
    }
}

fn sort_cmp_seq<'a>(
    mut a: impl Iterator<Item = &'a Value>,
    mut b: impl Iterator<Item = &'a Value>,
) -> Ordering {
    loop {
        match (a.next(), b.next()) {
            (Some(x), Some(y)) => match x.sort_cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            },
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a.compare(*b) == Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| other.get(k).is_some_and(|ov| ov == v))
                    && b.iter().all(|(k, _)| self.get(k).is_some())
            }
            (Value::Tags(a), Value::Tags(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Tags(tags) => write!(f, "{}", tags),
            Value::List(_) | Value::Map(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(Number::from(&n)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(Number::I64(n as i64))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::I64(n))
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::F64(n))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<TagSet> for Value {
    fn from(tags: TagSet) -> Self {
        Value::Tags(tags)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// Numeric value.
///
/// Integers and floats are kept apart so that `1` and `1.0` serialize back
/// exactly as they were read. Comparisons across variants go through `f64`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    /// Signed 64-bit integer.
    I64(i64),
    /// Unsigned integer too large for `i64`.
    U64(u64),
    /// 64-bit floating point.
    F64(f64),
}

impl Number {
    pub fn to_f64(self) -> f64 {
        match self {
            Number::I64(n) => n as f64,
            Number::U64(n) => n as f64,
            Number::F64(n) => n,
        }
    }

    /// Returns the value as `i64` when it is an integer that fits.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Number::I64(n) => Some(n),
            Number::U64(n) => i64::try_from(n).ok(),
            Number::F64(_) => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Number::F64(_))
    }

    /// Compares two numbers, handling mixed types.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::I64(a), Number::I64(b)) => Some(a.cmp(&b)),
            (Number::U64(a), Number::U64(b)) => Some(a.cmp(&b)),
            (Number::F64(a), Number::F64(b)) => a.partial_cmp(&b),
            _ => self.to_f64().partial_cmp(&other.to_f64()),
        }
    }

    /// Total order: by numeric value, NaN last, a float before an integer
    /// of the same value, and integers exactly.
    fn sort_cmp(self, other: Number) -> Ordering {
        let approx = |n: Number| match n.to_f64() {
            f if f.is_nan() => f64::NAN,
            f => f,
        };
        let exact = |n: Number| match n {
            Number::I64(n) => Some(i128::from(n)),
            Number::U64(n) => Some(i128::from(n)),
            Number::F64(_) => None,
        };
        approx(self)
            .total_cmp(&approx(other))
            .then_with(|| exact(self).cmp(&exact(other)))
    }

    fn to_json(self) -> serde_json::Value {
        match self {
            Number::I64(n) => serde_json::Value::from(n),
            Number::U64(n) => serde_json::Value::from(n),
            Number::F64(n) => serde_json::Number::from_f64(n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.compare(*other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(*other)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::I64(n) => write!(f, "{}", n),
            Number::U64(n) => write!(f, "{}", n),
            // Debug formatting keeps the decimal point (`1.0`), so floats
            // read back as floats.
            Number::F64(n) => write!(f, "{:?}", n),
        }
    }
}

impl From<i64> for Number {
    fn from(n: i64) -> Self {
        Number::I64(n)
    }
}

impl From<u64> for Number {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Number::U64(n), Number::I64)
    }
}

impl From<f64> for Number {
    fn from(n: f64) -> Self {
        Number::F64(n)
    }
}

impl From<&serde_json::Number> for Number {
    fn from(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            Number::I64(i)
        } else if let Some(u) = n.as_u64() {
            Number::U64(u)
        } else {
            Number::F64(n.as_f64().unwrap_or(f64::NAN))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from(0.0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Tags(TagSet::default()).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::from(-1).is_truthy());
        assert!(Value::Tags(TagSet::new(["a"])).is_truthy());
    }

    #[test]
    fn numbers_compare_across_variants() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(
            Number::I64(5).compare(Number::U64(10)),
            Some(Ordering::Less)
        );
        assert_eq!(Number::F64(f64::NAN).compare(Number::F64(1.0)), None);
    }

    #[test]
    fn map_equality_ignores_key_order() {
        let a = Value::Map(vec![("x".into(), 1.into()), ("y".into(), 2.into())]);
        let b = Value::Map(vec![("y".into(), 2.into()), ("x".into(), 1.into())]);
        let c = Value::Map(vec![("x".into(), 1.into())]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn json_conversion_keeps_order_and_types() {
        let json = json!({"b": 1, "a": [1.5, "s", null, true]});
        let value = Value::from(json.clone());
        match &value {
            Value::Map(entries) => {
                assert_eq!(entries[0].0, "b");
                assert_eq!(entries[1].0, "a");
            }
            other => panic!("expected map, got {:?}", other),
        }
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn float_display_keeps_decimal_point() {
        assert_eq!(Number::F64(1.0).to_string(), "1.0");
        assert_eq!(Number::F64(0.25).to_string(), "0.25");
        assert_eq!(Number::I64(-3).to_string(), "-3");
    }

    #[test]
    fn u64_folds_into_i64_when_it_fits() {
        assert!(matches!(Number::from(5u64), Number::I64(5)));
        assert!(matches!(Number::from(u64::MAX), Number::U64(_)));
    }

    #[test]
    fn partial_compare_rejects_mixed_types() {
        assert_eq!(Value::from("a").partial_compare(&Value::from(1)), None);
        assert_eq!(
            Value::from("a").partial_compare(&Value::from("b")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from(vec![1, 2]).partial_compare(&Value::from(vec![1, 3])),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn sort_order_is_total_across_types() {
        let mut values = vec![
            Value::Null,
            Value::from("b"),
            Value::from(2),
            Value::from(f64::NAN),
            Value::from(true),
            Value::from("a"),
            Value::from(1.5),
            Value::from(vec![1]),
            Value::Map(vec![("k".into(), 1.into())]),
            Value::Tags(TagSet::new(["x"])),
            Value::from(-f64::NAN),
            Value::from(2.0),
        ];
        values.sort_by(Value::sort_cmp);
        let names: Vec<&str> = values.iter().map(Value::type_name).collect();
        assert_eq!(
            names,
            vec![
                "bool", "float", "float", "int", "float", "float", "string", "string", "list",
                "map", "tags", "null"
            ]
        );
        assert_eq!(values[1], Value::from(1.5));
        assert!(matches!(values[3], Value::Number(Number::I64(2))));
        assert_eq!(values[6], Value::from("a"));

        let big = Value::from(9_007_199_254_740_993i64);
        let near = Value::from(9_007_199_254_740_992i64);
        assert_eq!(near.sort_cmp(&big), Ordering::Less);
        assert_eq!(
            Value::from(vec![1, 2]).sort_cmp(&Value::from(vec![1])),
            Ordering::Greater
        );
    }
}
