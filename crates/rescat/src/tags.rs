//! Tag sets.
//!
//! A [`TagSet`] is the value of a resource's reserved `tags` attribute. It
//! behaves like a set of strings, with one extra access mode: attribute-style
//! lookup. `tags.important` in an expression is `true` when the resource is
//! tagged `important` and `false` otherwise. Probing a tag that is not there
//! is never an error.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w][\w-]*$").expect("tag pattern is valid"));

/// Returns `true` if `tag` is a syntactically valid tag.
///
/// Tags start with a word character and continue with word characters or
/// hyphens.
pub fn is_valid_tag(tag: &str) -> bool {
    TAG_PATTERN.is_match(tag)
}

/// A set of unique tags with attribute-style boolean lookup.
///
/// # Example
///
/// ```
/// use rescat::TagSet;
///
/// let tags = TagSet::new(["alpha", "beta", "alpha"]);
/// assert_eq!(tags.len(), 2);
/// assert!(tags.contains("alpha"));
/// assert!(tags.attr("beta"));
/// assert!(!tags.attr("gamma"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    tags: BTreeSet<String>,
}

impl TagSet {
    /// Creates a tag set from a sequence of strings, collapsing duplicates.
    ///
    /// No syntax validation is performed; use [`TagSet::parse`] for input
    /// coming from a collection source.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a tag set, rejecting tags that are not valid tag syntax.
    pub fn parse<I, S>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            let tag = tag.into();
            if !is_valid_tag(&tag) {
                return Err(Error::InvalidTag(tag));
            }
            set.insert(tag);
        }
        Ok(Self { tags: set })
    }

    /// Returns `true` if `tag` is a member.
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Attribute-style lookup: `true` iff `identifier` names a member.
    ///
    /// Equivalent to [`contains`](Self::contains); exists so the expression
    /// evaluator and callers can express `tags.x` directly.
    pub fn attr(&self, identifier: &str) -> bool {
        self.contains(identifier)
    }

    /// Adds a tag. Returns `true` if it was not already present.
    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    /// Removes a tag. Returns `true` if it was present.
    pub fn remove(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    /// Returns the union of two tag sets.
    pub fn union(&self, other: &TagSet) -> TagSet {
        TagSet {
            tags: self.tags.union(&other.tags).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates over the tags in sorted order.
    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.tags.iter()
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        TagSet::new(iter)
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        write!(f, "{}", joined.join(" "))
    }
}
