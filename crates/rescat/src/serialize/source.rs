//! Declarative source form: a script of `export(...)` statements.
//!
//! ```text
//! from rescat import export
//!
//! export(
//!     "sample1",
//!     path="/data/sample1.bam",
//!     tags=["rna", "tumor"],
//! )
//! ```
//!
//! The reader is a literal-only interpreter. Import lines and comments are
//! accepted and ignored; every other statement must be an `export` call
//! whose arguments are literals. Nothing in a source file can reach the
//! filesystem, the network, or the process.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::collection::ResourceCollection;
use crate::error::{Error, ParseError, Result};
use crate::expr::keyword_literal;
use crate::expr::lexer::{tokenize, Token, TokenKind};
use crate::resource::{Resource, NAME};
use crate::value::{Number, Value};

/// First line of every written source file.
pub const SOURCE_HEADER: &str = "from rescat import export";

const EXPORT: &str = "export";

/// Deepest nesting of list, tuple and mapping literals.
const MAX_DEPTH: usize = 128;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

/// Words that cannot be keyword-argument names in the written form.
const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "true", "false", "null",
];

fn is_keyword_argument(key: &str) -> bool {
    IDENTIFIER.is_match(key) && !RESERVED_WORDS.contains(&key)
}

/// Writes the collection as source text.
///
/// Attributes are written as keyword arguments in recorded order. When any
/// attribute name cannot be a keyword argument, all of that resource's
/// attributes go into a single `**{...}` mapping so the order is kept.
pub fn write_source(collection: &ResourceCollection) -> String {
    let mut out = String::new();
    out.push_str(SOURCE_HEADER);
    out.push('\n');
    for resource in collection {
        out.push('\n');
        write_resource(&mut out, resource);
    }
    out
}

fn write_resource(out: &mut String, resource: &Resource) {
    let name = quote(resource.name());
    let attrs: Vec<_> = resource.attributes().collect();
    if attrs.is_empty() {
        out.push_str(&format!("{}({})\n", EXPORT, name));
        return;
    }
    if attrs.iter().all(|(k, _)| is_keyword_argument(k)) {
        out.push_str(&format!("{}(\n    {},\n", EXPORT, name));
        for (key, value) in attrs {
            out.push_str(&format!("    {}={},\n", key, literal(value)));
        }
        out.push_str(")\n");
    } else {
        out.push_str(&format!("{}({}, **{{\n", EXPORT, name));
        for (key, value) in attrs {
            out.push_str(&format!("    {}: {},\n", quote(key), literal(value)));
        }
        out.push_str("})\n");
    }
}

/// Double-quoted string literal with JSON escaping, which the reader's
/// string syntax accepts.
fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(Number::F64(f)) if !f.is_finite() => "None".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Tags(tags) => {
            let items: Vec<String> = tags.iter().map(|t| quote(t)).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) => {
            let items: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), literal(v)))
                .collect();
            format!("{{{}}}", items.join(", "))
        }
    }
}

/// Reads the source form.
pub fn read_source(text: &str) -> Result<ResourceCollection> {
    let tokens = tokenize(text)
        .map_err(|e| ParseError::new("source", e.line, e.column, e.message))?;
    let mut reader = SourceReader {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut collection = ResourceCollection::default();
    while let Some(resource) = reader.statement()? {
        collection.push(resource)?;
    }
    Ok(collection)
}

struct SourceReader {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl SourceReader {
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_next(&self) -> &TokenKind {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let token = self.current();
        ParseError::new("source", token.line, token.column, message).into()
    }

    fn unexpected(&self, expected: &str) -> Error {
        self.error(format!("expected {}, found {}", expected, self.peek().describe()))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<()> {
        if self.peek() == &kind {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    /// Runs `read` inside one more level of brackets.
    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!(
                "literal nested more than {} levels deep",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn at_ident(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(w) if w == word)
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Reads statements until the next export. `None` at end of input.
    fn statement(&mut self) -> Result<Option<Resource>> {
        loop {
            match self.peek() {
                TokenKind::Eof => return Ok(None),
                TokenKind::Semicolon => {
                    self.advance();
                }
                TokenKind::Ident(word) if word == "from" => self.from_import()?,
                TokenKind::Ident(word) if word == "import" => self.import()?,
                TokenKind::Ident(word) if word == EXPORT => return self.export().map(Some),
                TokenKind::Ident(word) => {
                    let message = format!(
                        "unsupported statement '{}': only imports and {}(...) calls are allowed",
                        word, EXPORT
                    );
                    return Err(self.error(message));
                }
                _ => return Err(self.unexpected("a statement")),
            }
        }
    }

    fn dotted_name(&mut self) -> Result<()> {
        self.identifier()?;
        while self.peek() == &TokenKind::Dot {
            self.advance();
            self.identifier()?;
        }
        Ok(())
    }

    fn alias(&mut self) -> Result<()> {
        if self.at_ident("as") {
            self.advance();
            self.identifier()?;
        }
        Ok(())
    }

    // from a.b import (x as y, z)
    fn from_import(&mut self) -> Result<()> {
        self.advance();
        self.dotted_name()?;
        if !self.at_ident("import") {
            return Err(self.unexpected("'import'"));
        }
        self.advance();
        let parenthesized = self.peek() == &TokenKind::LParen;
        if parenthesized {
            self.advance();
        }
        loop {
            self.identifier()?;
            self.alias()?;
            if self.peek() == &TokenKind::Comma {
                self.advance();
                if parenthesized && self.peek() == &TokenKind::RParen {
                    break;
                }
            } else {
                break;
            }
        }
        if parenthesized {
            self.expect(TokenKind::RParen)?;
        }
        Ok(())
    }

    // import a.b as c, d
    fn import(&mut self) -> Result<()> {
        self.advance();
        loop {
            self.dotted_name()?;
            self.alias()?;
            if self.peek() != &TokenKind::Comma {
                return Ok(());
            }
            self.advance();
        }
    }

    fn export(&mut self) -> Result<Resource> {
        let (line, column) = (self.current().line, self.current().column);
        self.advance();
        self.expect(TokenKind::LParen)?;

        let mut name: Option<String> = None;
        let mut attrs: Vec<(String, Value)> = Vec::new();
        let mut seen = HashSet::new();
        let mut positional = 0;

        while self.peek() != &TokenKind::RParen {
            match (self.peek().clone(), self.peek_next().clone()) {
                (TokenKind::DoubleStar, _) => {
                    self.advance();
                    let entries = match self.literal()? {
                        Value::Map(entries) => entries,
                        other => {
                            return Err(self.error(format!(
                                "argument after ** must be a mapping, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    for (key, value) in entries {
                        self.keyword(&mut name, &mut attrs, &mut seen, key, value)?;
                    }
                }
                (TokenKind::Ident(key), TokenKind::Assign) => {
                    self.advance();
                    self.advance();
                    let value = self.literal()?;
                    self.keyword(&mut name, &mut attrs, &mut seen, key, value)?;
                }
                _ => {
                    if positional > 0 || !seen.is_empty() {
                        return Err(self.error(format!(
                            "{}() takes the name as its only positional argument",
                            EXPORT
                        )));
                    }
                    match self.literal()? {
                        Value::String(s) => name = Some(s),
                        other => {
                            return Err(self.error(format!(
                                "resource name must be a string, not {}",
                                other.type_name()
                            )))
                        }
                    }
                    seen.insert(NAME.to_string());
                    positional += 1;
                }
            }
            if self.peek() == &TokenKind::Comma {
                self.advance();
            } else if self.peek() != &TokenKind::RParen {
                return Err(self.unexpected("',' or ')'"));
            }
        }
        self.advance();

        let name = name.ok_or_else(|| {
            Error::from(ParseError::new(
                "source",
                line,
                column,
                format!("{}() requires a resource name", EXPORT),
            ))
        })?;
        Resource::from_attrs(name, attrs)
    }

    fn keyword(
        &self,
        name: &mut Option<String>,
        attrs: &mut Vec<(String, Value)>,
        seen: &mut HashSet<String>,
        key: String,
        value: Value,
    ) -> Result<()> {
        if !seen.insert(key.clone()) {
            return Err(self.error(format!(
                "{}() got multiple values for argument '{}'",
                EXPORT, key
            )));
        }
        if key == NAME {
            match value {
                Value::String(s) => *name = Some(s),
                other => {
                    return Err(self.error(format!(
                        "resource name must be a string, not {}",
                        other.type_name()
                    )))
                }
            }
        } else {
            attrs.push((key, value));
        }
        Ok(())
    }

    fn literal(&mut self) -> Result<Value> {
        match self.peek().clone() {
            TokenKind::Str(mut s) => {
                self.advance();
                // Adjacent string literals concatenate.
                while let TokenKind::Str(next) = self.peek().clone() {
                    s.push_str(&next);
                    self.advance();
                }
                Ok(Value::String(s))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(Value::Number(n))
            }
            TokenKind::Minus => {
                self.advance();
                match self.peek().clone() {
                    TokenKind::Number(n) => {
                        self.advance();
                        Ok(Value::Number(negate(n)))
                    }
                    _ => Err(self.unexpected("number")),
                }
            }
            TokenKind::Ident(word) => match keyword_literal(&word) {
                Some(value) => {
                    self.advance();
                    Ok(value)
                }
                None => Err(self.error(format!(
                    "only literal values are allowed, found '{}'",
                    word
                ))),
            },
            TokenKind::LBracket => {
                self.advance();
                let (items, _) = self.nested(|r| r.sequence(TokenKind::RBracket))?;
                Ok(Value::List(items))
            }
            TokenKind::LParen => {
                self.advance();
                let (mut items, trailing_comma) =
                    self.nested(|r| r.sequence(TokenKind::RParen))?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::List(items))
                }
            }
            TokenKind::LBrace => {
                self.advance();
                self.nested(Self::mapping)
            }
            _ => Err(self.unexpected("a literal")),
        }
    }

    /// Comma-separated literals up to `close`. Also reports whether the
    /// last item was followed by a comma, which makes `(x,)` a tuple.
    fn sequence(&mut self, close: TokenKind) -> Result<(Vec<Value>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        while self.peek() != &close {
            items.push(self.literal()?);
            trailing_comma = false;
            if self.peek() == &TokenKind::Comma {
                self.advance();
                trailing_comma = true;
            } else if self.peek() != &close {
                return Err(self.unexpected(&format!("',' or {}", close.describe())));
            }
        }
        self.advance();
        Ok((items, trailing_comma))
    }

    fn mapping(&mut self) -> Result<Value> {
        let mut entries: Vec<(String, Value)> = Vec::new();
        while self.peek() != &TokenKind::RBrace {
            let key = match self.literal()? {
                Value::String(key) => key,
                other => {
                    return Err(self.error(format!(
                        "mapping keys must be strings, not {}",
                        other.type_name()
                    )))
                }
            };
            self.expect(TokenKind::Colon)?;
            let value = self.literal()?;
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, slot)) => *slot = value,
                None => entries.push((key, value)),
            }
            if self.peek() == &TokenKind::Comma {
                self.advance();
            } else if self.peek() != &TokenKind::RBrace {
                return Err(self.unexpected("',' or '}'"));
            }
        }
        self.advance();
        Ok(Value::Map(entries))
    }
}

fn negate(n: Number) -> Number {
    match n {
        Number::I64(i) => i.checked_neg().map_or(Number::F64(-(i as f64)), Number::I64),
        Number::U64(u) if u == i64::MAX as u64 + 1 => Number::I64(i64::MIN),
        Number::U64(u) => Number::F64(-(u as f64)),
        Number::F64(f) => Number::F64(-f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagSet;

    #[test]
    fn reads_positional_keyword_and_splat_forms() {
        let text = r#"
from rescat import export

# first
export(
    "dataset1",
    path="/path/to/file1.csv",
    tags=["alpha", "beta"],
    size=-12,
)

export(name="dataset2", ratio=0.5, ok=True, nothing=None)

export("dataset3", **{
    "path": "/else2.bam",
    "odd key": [1, (2, 3), {"x": "y"}],
})
"#;
        let c = read_source(text).unwrap();
        assert_eq!(c.names(), vec!["dataset1", "dataset2", "dataset3"]);

        let d1 = c.get("dataset1").unwrap();
        assert_eq!(d1.keys(), vec!["name", "path", "tags", "size"]);
        assert_eq!(d1.tags(), Some(&TagSet::new(["alpha", "beta"])));
        assert_eq!(d1["size"], Value::from(-12));

        let d2 = c.get("dataset2").unwrap();
        assert_eq!(d2["ok"], Value::Bool(true));
        assert_eq!(d2["nothing"], Value::Null);

        let d3 = c.get("dataset3").unwrap();
        assert_eq!(d3.keys(), vec!["name", "path", "odd key"]);
        assert_eq!(
            d3["odd key"],
            Value::List(vec![
                Value::from(1),
                Value::from(vec![2, 3]),
                Value::Map(vec![("x".into(), "y".into())]),
            ])
        );
    }

    #[test]
    fn rejects_non_literal_code() {
        for text in [
            "import os\nos.system('rm -rf /')",
            "export('a', path=open('/etc/passwd'))",
            "x = 1",
            "export('a', k=1 + 2)",
        ] {
            assert!(
                matches!(read_source(text), Err(Error::Parse(ref e)) if e.format == "source"),
                "accepted: {text}"
            );
        }
    }

    #[test]
    fn errors_carry_position() {
        let err = read_source("export('a',\n   k=foo)").unwrap_err();
        match err {
            Error::Parse(e) => assert_eq!((e.line, e.column), (2, 6)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn argument_mistakes() {
        assert!(read_source("export(k=1)").is_err());
        assert!(read_source("export('a', k=1, k=2)").is_err());
        assert!(read_source("export('a', name='b')").is_err());
        assert!(read_source("export('a', 'b')").is_err());
        assert!(read_source("export('a', **[1])").is_err());
        assert!(matches!(
            read_source("export('a')\nexport('a')"),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn nesting_depth_is_bounded() {
        let deep = format!(
            "export('a', v={}{})",
            "[".repeat(200_000),
            "]".repeat(200_000)
        );
        match read_source(&deep).unwrap_err() {
            Error::Parse(e) => {
                assert_eq!(e.line, 1);
                assert!(e.message.contains("levels deep"), "{}", e.message);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let maps = format!("export('a', v={}1{})", "{'k': ".repeat(500), "}".repeat(500));
        assert!(matches!(read_source(&maps), Err(Error::Parse(_))));

        let nested = format!("export('a', v={}1{})", "[(".repeat(30), ",)]".repeat(30));
        let c = read_source(&nested).unwrap();
        assert!(matches!(c.singleton().unwrap()["v"], Value::List(_)));
    }

    #[test]
    fn writes_keywords_or_splat() {
        let c = ResourceCollection::new([
            Resource::new("a").with("k", 1).with("f", 2.0).with_tags(["x"]),
            Resource::new("b").with("odd key", "v\"q").with("z", Value::Null),
            Resource::new("c"),
        ])
        .unwrap();
        let text = write_source(&c);
        assert_eq!(
            text,
            "from rescat import export\n\
             \n\
             export(\n    \"a\",\n    k=1,\n    f=2.0,\n    tags=[\"x\"],\n)\n\
             \n\
             export(\"b\", **{\n    \"odd key\": \"v\\\"q\",\n    \"z\": None,\n})\n\
             \n\
             export(\"c\")\n"
        );
        assert_eq!(read_source(&text).unwrap(), c);
    }

    #[test]
    fn reserved_words_force_splat() {
        let c = ResourceCollection::new([Resource::new("a").with("class", 1)]).unwrap();
        assert!(write_source(&c).contains("**{"));
    }
}
