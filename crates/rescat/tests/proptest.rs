//! Property-based tests for serialization and filtering.

use proptest::prelude::*;
use rescat::serialize::{read, read_json, read_source, write_json, write_source};
use rescat::{Resource, ResourceCollection, Value, NAME, TAGS};

// ============================================================================
// Strategies
// ============================================================================

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-1_000_000_000i64..1_000_000_000).prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[a-zA-Z0-9 ./_#'\"\\\\-]{0,12}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::List),
            prop::collection::btree_map("[a-z][a-z0-9 _#-]{0,5}", inner, 0..4)
                .prop_map(|m| Value::Map(m.into_iter().collect())),
        ]
    })
}

type Body = (Vec<(String, Value)>, Option<Vec<String>>);

fn body() -> impl Strategy<Value = Body> {
    (
        prop::collection::vec(("[a-z][a-z0-9_#-]{0,6}", value()), 0..5),
        prop::option::of(prop::collection::vec("[a-z][a-z0-9-]{0,5}", 0..4)),
    )
}

fn build(name: String, (attrs, tags): Body) -> Resource {
    let mut resource = Resource::new(name);
    for (key, value) in attrs {
        if key != NAME && key != TAGS {
            resource = resource.with(key, value);
        }
    }
    match tags {
        Some(tags) => resource.with_tags(tags),
        None => resource,
    }
}

fn collection() -> impl Strategy<Value = ResourceCollection> {
    prop::collection::btree_set("[a-z][a-z0-9_.#-]{0,8}", 0..8)
        .prop_flat_map(|names| {
            let n = names.len();
            (Just(names), prop::collection::vec(body(), n))
        })
        .prop_map(|(names, bodies)| {
            let resources = names.into_iter().zip(bodies).map(|(n, b)| build(n, b));
            ResourceCollection::new(resources).unwrap()
        })
}

/// A collection whose resources carry an optional integer `v` and tags
/// drawn from a small vocabulary, for filter properties.
fn tagged_collection() -> impl Strategy<Value = ResourceCollection> {
    prop::collection::vec(
        (
            prop::option::of(-50i64..50),
            prop::collection::vec(prop::sample::select(vec!["a", "b", "c"]), 0..3),
        ),
        0..20,
    )
    .prop_map(|items| {
        let resources = items.into_iter().enumerate().map(|(i, (v, tags))| {
            let resource = Resource::new(format!("r{}", i)).with_tags(tags);
            match v {
                Some(v) => resource.with("v", v),
                None => resource,
            }
        });
        ResourceCollection::new(resources).unwrap()
    })
}

fn filter_expression() -> impl Strategy<Value = String> {
    prop_oneof![
        (-50i64..50).prop_map(|t| format!("v > {}", t)),
        Just("tags.a".to_string()),
        Just("tags.b and not tags.c".to_string()),
        Just("has('v') and v % 2 == 0".to_string()),
        Just("'a' in tags or v == None".to_string()),
    ]
}

fn assert_same_order(a: &ResourceCollection, b: &ResourceCollection) -> Result<(), TestCaseError> {
    for (x, y) in a.iter().zip(b.iter()) {
        prop_assert_eq!(x.keys(), y.keys());
    }
    Ok(())
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    /// JSON output reads back to the same collection, attribute order included.
    #[test]
    fn json_round_trip(c in collection()) {
        let back = read_json(&write_json(&c)).unwrap();
        prop_assert_eq!(&back, &c);
        assert_same_order(&back, &c)?;
    }

    /// Source output reads back to the same collection, attribute order included.
    #[test]
    fn source_round_trip(c in collection()) {
        let back = read_source(&write_source(&c)).unwrap();
        prop_assert_eq!(&back, &c);
        assert_same_order(&back, &c)?;
    }

    /// Format detection picks the right reader for both outputs.
    #[test]
    fn detected_round_trip(c in collection()) {
        prop_assert_eq!(&read(&write_json(&c)).unwrap(), &c);
        prop_assert_eq!(&read(&write_source(&c)).unwrap(), &c);
    }

    /// Names and keys the JSON form would read as comments never get in.
    #[test]
    fn comment_prefixed_keys_are_refused(key in "#[a-z0-9_-]{0,6}", b in body()) {
        prop_assert!(ResourceCollection::new([build(key.clone(), b.clone())]).is_err());
        let mut resource = build("r".to_string(), b);
        prop_assert!(resource.set(key.as_str(), 1).is_err());
        let nested = Value::List(vec![Value::Map(vec![(key, Value::Null)])]);
        prop_assert!(resource.set("meta", nested).is_err());
    }

    /// Filtering a filtered collection again changes nothing.
    #[test]
    fn filter_is_idempotent(c in tagged_collection(), e in filter_expression()) {
        let once = c.filter(e.as_str()).unwrap();
        let twice = once.filter(e.as_str()).unwrap();
        prop_assert_eq!(once, twice);
    }

    /// Survivors keep their relative order and are never duplicated.
    #[test]
    fn filter_preserves_order(c in tagged_collection(), e in filter_expression()) {
        let filtered = c.filter(e.as_str()).unwrap();
        prop_assert!(filtered.len() <= c.len());
        let names = c.names();
        let positions: Vec<usize> = filtered
            .iter()
            .map(|r| names.iter().position(|n| *n == r.name()).unwrap())
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    /// Filtering never mutates the source collection.
    #[test]
    fn filter_leaves_source_untouched(c in tagged_collection(), e in filter_expression()) {
        let before = c.clone();
        let _ = c.filter(e.as_str()).unwrap();
        prop_assert_eq!(c, before);
    }
}
