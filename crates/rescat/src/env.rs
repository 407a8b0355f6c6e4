//! Process environment abstractions.
//!
//! The loader reads stdin and the hook configuration reads environment
//! variables through these traits, so tests can run without piping data or
//! touching the real environment.

use std::collections::HashMap;
use std::io::{self, IsTerminal, Read};

/// Abstraction over stdin reading.
pub trait StdinReader {
    /// Returns `true` if stdin is interactive rather than piped.
    fn is_terminal(&self) -> bool;

    /// Reads all of stdin.
    fn read_to_string(&self) -> io::Result<String>;
}

/// Abstraction over environment variables.
pub trait EnvReader {
    fn var(&self, name: &str) -> Option<String>;
}

/// Real stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealStdin;

impl StdinReader for RealStdin {
    fn is_terminal(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn read_to_string(&self) -> io::Result<String> {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}

/// Real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealEnv;

impl EnvReader for RealEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Stdin stand-in for tests.
#[derive(Debug, Clone)]
pub struct MockStdin {
    is_terminal: bool,
    content: String,
}

impl MockStdin {
    /// Simulates an interactive terminal with nothing piped.
    pub fn terminal() -> Self {
        Self {
            is_terminal: true,
            content: String::new(),
        }
    }

    /// Simulates piped input.
    pub fn piped(content: impl Into<String>) -> Self {
        Self {
            is_terminal: false,
            content: content.into(),
        }
    }
}

impl StdinReader for MockStdin {
    fn is_terminal(&self) -> bool {
        self.is_terminal
    }

    fn read_to_string(&self) -> io::Result<String> {
        Ok(self.content.clone())
    }
}

/// Environment stand-in for tests.
#[derive(Debug, Clone, Default)]
pub struct MockEnv {
    vars: HashMap<String, String>,
}

impl MockEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvReader for MockEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_stdin_modes() {
        assert!(MockStdin::terminal().is_terminal());
        let piped = MockStdin::piped("{}");
        assert!(!piped.is_terminal());
        assert_eq!(piped.read_to_string().unwrap(), "{}");
    }

    #[test]
    fn mock_env_lookup() {
        let env = MockEnv::new().with_var("A", "1");
        assert_eq!(env.var("A"), Some("1".to_string()));
        assert_eq!(env.var("B"), None);
    }
}
