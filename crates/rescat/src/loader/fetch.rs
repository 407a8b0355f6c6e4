//! Fetching raw collection text.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::env::{RealStdin, StdinReader};
use crate::error::{Error, Result};

/// Where collection text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Standard input, written `-`.
    Stdin,
    /// A local file, written as a path or a `file://` URL.
    File(PathBuf),
    /// An http or https URL.
    Url(String),
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin => f.write_str("-"),
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Url(url) => f.write_str(url),
        }
    }
}

/// Turns a [`Source`] into text.
pub trait Fetcher {
    fn fetch(&self, source: &Source) -> Result<String>;
}

impl<F> Fetcher for F
where
    F: Fn(&Source) -> Result<String>,
{
    fn fetch(&self, source: &Source) -> Result<String> {
        self(source)
    }
}

/// Reads local files and stdin, and http(s) URLs when the `http` feature is
/// enabled.
///
/// Stdin is read only when it is piped; an interactive terminal is an error
/// rather than a silent wait for input.
///
/// # Testing
///
/// Use [`DefaultFetcher::with_stdin`] to inject a mock:
///
/// ```
/// use rescat::env::MockStdin;
/// use rescat::loader::{DefaultFetcher, Fetcher, Source};
///
/// let fetcher = DefaultFetcher::with_stdin(MockStdin::piped("{}"));
/// assert_eq!(fetcher.fetch(&Source::Stdin).unwrap(), "{}");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher<R: StdinReader = RealStdin> {
    stdin: R,
}

impl DefaultFetcher<RealStdin> {
    pub fn new() -> Self {
        Self { stdin: RealStdin }
    }
}

impl<R: StdinReader> DefaultFetcher<R> {
    /// Create a fetcher with a custom stdin reader.
    pub fn with_stdin(stdin: R) -> Self {
        Self { stdin }
    }
}

impl<R: StdinReader> Fetcher for DefaultFetcher<R> {
    fn fetch(&self, source: &Source) -> Result<String> {
        debug!(source = %source, "fetching");
        match source {
            Source::Stdin => {
                if self.stdin.is_terminal() {
                    return Err(Error::location(
                        "-",
                        "stdin is a terminal; pipe a collection into it",
                    ));
                }
                self.stdin.read_to_string().map_err(|source| Error::Fetch {
                    location: "-".to_string(),
                    source,
                })
            }
            Source::File(path) => fs::read_to_string(path).map_err(|source| Error::Fetch {
                location: path.display().to_string(),
                source,
            }),
            Source::Url(url) => fetch_url(url),
        }
    }
}

#[cfg(feature = "http")]
fn fetch_url(url: &str) -> Result<String> {
    reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(|e| Error::Remote {
            location: url.to_string(),
            message: e.to_string(),
        })
}

#[cfg(not(feature = "http"))]
fn fetch_url(url: &str) -> Result<String> {
    Err(Error::Remote {
        location: url.to_string(),
        message: "built without the `http` feature".to_string(),
    })
}
