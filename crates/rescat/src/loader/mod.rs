//! Loading collections from locations.
//!
//! A location names where the text lives and, optionally, what to do with
//! the collection once it is read:
//!
//! ```text
//! datasets.json
//! file:///data/datasets.py#filter=tags.rna
//! https://example.org/datasets.json#filter=tags.rna&filter=reads > 100
//! -#format=source&transform=hooks/add_urls.toml
//! ```
//!
//! The fragment after `#` is a list of `key=value` pairs separated by `&`,
//! applied left to right. Values are taken verbatim, spaces included:
//!
//! | Key | Effect |
//! |-----|--------|
//! | `filter` | keep resources matching the expression |
//! | `transform` | apply a transform hook file |
//! | `format` | parse as `json` or `source` instead of guessing |
//! | `hooks` | `false` skips the loader's configured transforms |
//!
//! Any script taking a location string therefore gets filtering for free:
//! `load("c.json#filter=tags.rna")` equals `load("c.json")` filtered by
//! `tags.rna`.

mod fetch;

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::collection::ResourceCollection;
use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::hooks::{HookPipeline, TransformScript};
use crate::serialize::{self, Format};

pub use fetch::{DefaultFetcher, Fetcher, Source};

/// A fragment operation, applied after parsing.
#[derive(Debug, Clone)]
pub enum Operation {
    Filter(Expression),
    Transform(PathBuf),
}

/// A parsed location string.
#[derive(Debug, Clone)]
pub struct Location {
    text: String,
    base: String,
    source: Source,
    operations: Vec<Operation>,
    format: Option<Format>,
    hooks: Option<bool>,
}

impl Location {
    /// Parses a location. Fragment filters are compiled here, so a bad
    /// expression fails before anything is fetched.
    pub fn parse(text: &str) -> Result<Self> {
        let (base, fragment) = match text.split_once('#') {
            Some((base, fragment)) => (base, fragment),
            None => (text, ""),
        };
        if base.trim().is_empty() {
            return Err(Error::location(text, "empty location"));
        }

        let mut location = Self {
            text: text.to_string(),
            base: base.to_string(),
            source: parse_source(text, base)?,
            operations: Vec::new(),
            format: None,
            hooks: None,
        };

        let fragment = fragment.strip_prefix('&').unwrap_or(fragment);
        if fragment.is_empty() {
            return Ok(location);
        }
        for pair in fragment.split('&') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::location(text, format!("expected key=value, got '{}'", pair)))?;
            match key.to_ascii_lowercase().as_str() {
                "filter" => location
                    .operations
                    .push(Operation::Filter(Expression::parse(value)?)),
                "transform" => location
                    .operations
                    .push(Operation::Transform(PathBuf::from(value))),
                "format" => {
                    location.format =
                        Some(value.parse().map_err(|e: String| Error::location(text, e))?)
                }
                "hooks" | "environment_transforms" => {
                    location.hooks = Some(match value.to_ascii_lowercase().as_str() {
                        "true" => true,
                        "false" => false,
                        other => {
                            return Err(Error::location(
                                text,
                                format!("{} must be true or false, not '{}'", key, other),
                            ))
                        }
                    })
                }
                other => {
                    return Err(Error::location(
                        text,
                        format!("unsupported fragment key '{}'", other),
                    ))
                }
            }
        }
        Ok(location)
    }

    /// The location as written, fragment included.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The location without its fragment.
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Format forced by the fragment, if any.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Whether configured transforms should run. Defaults to true.
    pub fn run_hooks(&self) -> bool {
        self.hooks.unwrap_or(true)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl std::str::FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_source(text: &str, base: &str) -> Result<Source> {
    if base == "-" {
        return Ok(Source::Stdin);
    }
    match base.split_once("://") {
        Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
            "file" => Ok(Source::File(PathBuf::from(rest))),
            "http" | "https" => Ok(Source::Url(base.to_string())),
            other => Err(Error::location(
                text,
                format!("unsupported scheme '{}'", other),
            )),
        },
        None => Ok(Source::File(PathBuf::from(base))),
    }
}

/// Fetches, parses and post-processes collections.
///
/// ```no_run
/// use rescat::{HookConfig, HookPipeline, Loader};
///
/// let hooks = HookPipeline::from_config(&HookConfig::from_env())?;
/// let collection = Loader::new()
///     .with_hooks(hooks)
///     .load("datasets.py#filter=tags.rna")?;
/// # Ok::<(), rescat::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Loader<F: Fetcher = DefaultFetcher> {
    fetcher: F,
    hooks: HookPipeline,
    format: Option<Format>,
}

impl Loader<DefaultFetcher> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: Fetcher> Loader<F> {
    /// Replace the fetcher, keeping hooks and format.
    pub fn with_fetcher<G: Fetcher>(self, fetcher: G) -> Loader<G> {
        Loader {
            fetcher,
            hooks: self.hooks,
            format: self.format,
        }
    }

    /// Transforms to run after every load. Checkers in the pipeline are not
    /// run by the loader.
    pub fn with_hooks(mut self, hooks: HookPipeline) -> Self {
        self.hooks = hooks;
        self
    }

    /// Forces a format, overriding fragments and file extensions.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    pub fn load(&self, location: &str) -> Result<ResourceCollection> {
        self.load_location(&Location::parse(location)?)
    }

    pub fn load_location(&self, location: &Location) -> Result<ResourceCollection> {
        let text = self.fetcher.fetch(location.source())?;
        let format = self
            .format
            .or(location.format())
            .or_else(|| Format::from_path(location.base()));
        debug!(location = %location.base(), format = ?format, "parsing collection");

        let mut collection = serialize::read_as(&text, format)?.with_origin(location.base());
        for operation in location.operations() {
            match operation {
                Operation::Filter(expression) => {
                    debug!(filter = %expression, "applying fragment filter");
                    collection = collection.filter(expression)?;
                }
                Operation::Transform(path) => {
                    debug!(transform = %path.display(), "applying fragment transform");
                    HookPipeline::new()
                        .transform_script(TransformScript::load(path)?)
                        .apply_transforms(&mut collection)?;
                }
            }
        }
        if location.run_hooks() {
            self.hooks.apply_transforms(&mut collection)?;
        }
        info!(location = %location.base(), resources = collection.len(), "loaded collection");
        Ok(collection)
    }
}

/// Loads a location with the default fetcher and no configured hooks.
pub fn load(location: &str) -> Result<ResourceCollection> {
    Loader::new().load(location)
}
