//! Reading and writing collections as text.
//!
//! Two forms are supported:
//!
//! - **JSON**: an object keyed by resource name, see [`write_json`].
//! - **Source**: a declarative script of `export(...)` statements, see
//!   [`write_source`].
//!
//! Both writers are canonical and both readers restore the collection
//! exactly, attribute order included:
//!
//! ```
//! use rescat::{serialize, Resource, ResourceCollection};
//!
//! let collection = ResourceCollection::new([
//!     Resource::new("a").with("path", "/x.bam").with_tags(["t"]),
//! ])
//! .unwrap();
//!
//! let json = serialize::write_json(&collection);
//! let source = serialize::write_source(&collection);
//! assert_eq!(serialize::read(&json).unwrap(), collection);
//! assert_eq!(serialize::read(&source).unwrap(), collection);
//! ```

mod json;
mod source;

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::collection::ResourceCollection;
use crate::error::{Error, Result};

pub use json::{read_json, write_json};
pub use source::{read_source, write_source, SOURCE_HEADER};

/// A textual collection format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Source,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Source => "source",
        }
    }

    /// Guesses the format from a path's extension. Only `.json` is
    /// recognized; anything else is left to content detection.
    pub fn from_path(path: &str) -> Option<Format> {
        path.to_ascii_lowercase()
            .ends_with(".json")
            .then_some(Format::Json)
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "source" | "python" => Ok(Format::Source),
            other => Err(format!(
                "unsupported format '{}' (expected json or source)",
                other
            )),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads either form. JSON is tried first; text that is not JSON is read
/// as source.
///
/// When both readers reject the text, the error reported is the one from
/// the reader the text most resembles: JSON if it starts with `{`.
pub fn read(text: &str) -> Result<ResourceCollection> {
    match read_json(text) {
        Err(Error::Parse(json_err)) => {
            debug!(error = %json_err, "not JSON, reading as source");
            match read_source(text) {
                Err(Error::Parse(_)) if text.trim_start().starts_with('{') => {
                    Err(Error::Parse(json_err))
                }
                other => other,
            }
        }
        other => other,
    }
}

/// Reads with a known format, or detects it when `format` is `None`.
pub fn read_as(text: &str, format: Option<Format>) -> Result<ResourceCollection> {
    match format {
        Some(Format::Json) => read_json(text),
        Some(Format::Source) => read_source(text),
        None => read(text),
    }
}

/// Writes the collection in `format`.
pub fn write(collection: &ResourceCollection, format: Format) -> String {
    match format {
        Format::Json => write_json(collection),
        Format::Source => write_source(collection),
    }
}
