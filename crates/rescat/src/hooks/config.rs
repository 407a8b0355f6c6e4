//! Hook discovery.
//!
//! Hook file locations come from a TOML file:
//!
//! ```toml
//! [hooks]
//! transforms = ["hooks/add_urls.toml"]
//! checkers = ["hooks/paths.toml", "hooks/required.toml"]
//! ```
//!
//! or from the `RESCAT_TRANSFORMS` and `RESCAT_CHECKERS` environment
//! variables, each a colon-separated list of paths.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::env::{EnvReader, RealEnv};
use crate::error::{Error, Result};

/// Environment variable listing transform hook files.
pub const TRANSFORMS_VAR: &str = "RESCAT_TRANSFORMS";

/// Environment variable listing checker hook files.
pub const CHECKERS_VAR: &str = "RESCAT_CHECKERS";

/// Ordered hook file locations. List order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HookConfig {
    pub transforms: Vec<String>,
    pub checkers: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    hooks: HookConfig,
}

impl HookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transform(mut self, location: impl Into<String>) -> Self {
        self.transforms.push(location.into());
        self
    }

    pub fn checker(mut self, location: impl Into<String>) -> Self {
        self.checkers.push(location.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty() && self.checkers.is_empty()
    }

    /// Parses the `[hooks]` table of a configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string().trim_end().to_string()))?;
        Ok(file.hooks)
    }

    /// Loads a configuration file. Relative hook paths are resolved against
    /// the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Fetch {
            location: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let resolve = |entries: Vec<String>| -> Vec<String> {
            entries
                .into_iter()
                .map(|entry| {
                    if Path::new(&entry).is_absolute() {
                        entry
                    } else {
                        base.join(entry).display().to_string()
                    }
                })
                .collect()
        };
        Ok(Self {
            transforms: resolve(config.transforms),
            checkers: resolve(config.checkers),
        })
    }

    /// Reads the hook environment variables of this process.
    pub fn from_env() -> Self {
        Self::from_env_reader(&RealEnv)
    }

    /// Reads the hook environment variables through `env`.
    pub fn from_env_reader(env: &impl EnvReader) -> Self {
        let split = |name: &str| -> Vec<String> {
            env.var(name)
                .unwrap_or_default()
                .split(':')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(String::from)
                .collect()
        };
        Self {
            transforms: split(TRANSFORMS_VAR),
            checkers: split(CHECKERS_VAR),
        }
    }

    /// Appends `other`'s locations after this config's.
    pub fn merge(mut self, other: HookConfig) -> Self {
        self.transforms.extend(other.transforms);
        self.checkers.extend(other.checkers);
        self
    }
}
