//! rescat - named resource collections with sandboxed queries.
//!
//! A collection is an ordered set of named [`Resource`]s, metadata records
//! typically describing dataset files. Collections are loaded from JSON or
//! from a declarative `export(...)` source form, queried with a small
//! expression language, and written back in either form without loss.
//!
//! # Quick Start
//!
//! ```rust
//! use rescat::{serialize, MissingPolicy, Value};
//!
//! let collection = serialize::read(r#"
//!     export("tumor", path="/data/tumor.bam", reads=1200, tags=["rna", "important"])
//!     export("normal", path="/data/normal.bam", tags=["rna"])
//! "#)?;
//!
//! let important = collection.filter("tags.important")?;
//! assert_eq!(important.names(), vec!["tumor"]);
//!
//! let table = collection.select(&["name", "reads"], MissingPolicy::Default)?;
//! assert_eq!(table.column("reads").unwrap(), vec![&Value::from(1200), &Value::Null]);
//! # Ok::<(), rescat::Error>(())
//! ```
//!
//! # Missing Attributes
//!
//! Queries name attributes that some resources lack. The caller decides what
//! happens, per call, with [`MissingPolicy`]:
//!
//! | Policy | Effect of a missing attribute |
//! |--------|-------------------------------|
//! | `Default` | evaluates to null |
//! | `Error` | the query fails with [`ExpressionError::MissingAttribute`] |
//! | `Skip` | the resource is left out of the result |
//!
//! `has(...)` and `get(...)` inspect attributes without triggering the
//! policy.
//!
//! # Loading
//!
//! [`load`] accepts paths, `file://` and http(s) URLs, or `-` for stdin, with
//! an optional fragment of operations: `load("c.json#filter=tags.rna")`.
//! See [`loader`].
//!
//! # Hooks
//!
//! A [`HookPipeline`] holds transforms, which rewrite resources right after
//! loading, and checkers, which validate them on request. See [`hooks`].

pub mod collection;
pub mod env;
mod error;
pub mod expr;
pub mod hooks;
pub mod loader;
mod resource;
pub mod serialize;
mod tags;
mod value;

// Re-export public API
pub use collection::{FieldSpec, Predicate, ResourceCollection, Row, Table};
pub use error::{Error, ParseError, Result};
pub use expr::{Expression, ExpressionError, MissingPolicy};
pub use hooks::{
    Checker, HookConfig, HookPipeline, Outcome, ScriptChecker, TransformScript, ValidationReport,
    Verdict,
};
pub use loader::{load, Fetcher, Loader, Location, Source};
pub use resource::{Resource, NAME, TAGS};
pub use tags::{is_valid_tag, TagSet};
pub use value::{Number, Value};
