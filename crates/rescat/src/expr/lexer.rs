//! Tokenizer shared by the expression parser and the source-form reader.

use crate::value::Number;

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// Identifier or keyword (`and`, `True`, `export`, ...).
    Ident(String),
    Number(Number),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Dot,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

impl TokenKind {
    /// Short human-readable description for error messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("'{}'", name),
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Str(_) => "string".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::DoubleStar => "**",
            TokenKind::Slash => "/",
            TokenKind::DoubleSlash => "//",
            TokenKind::Percent => "%",
            TokenKind::Assign => "=",
            TokenKind::Eq => "==",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            _ => "?",
        }
    }
}

/// A token with its 1-based source position.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

/// A tokenization failure at a 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Tokenizes the whole input. The returned vector always ends with `Eof`.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, column: usize, message: impl Into<String>) -> LexError {
        LexError {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let token = |kind| Token { kind, line, column };

        let Some(c) = self.peek() else {
            return Ok(token(TokenKind::Eof));
        };

        if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(c) = self.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            return Ok(token(TokenKind::Ident(ident)));
        }

        if c.is_ascii_digit() {
            return self.number().map(|n| token(TokenKind::Number(n)));
        }

        if c == '"' || c == '\'' {
            return self.string(c).map(|s| token(TokenKind::Str(s)));
        }

        self.bump();
        let next = self.peek();
        let kind = match (c, next) {
            ('*', Some('*')) => self.double(TokenKind::DoubleStar),
            ('/', Some('/')) => self.double(TokenKind::DoubleSlash),
            ('=', Some('=')) => self.double(TokenKind::Eq),
            ('!', Some('=')) => self.double(TokenKind::Ne),
            ('<', Some('=')) => self.double(TokenKind::Le),
            ('>', Some('=')) => self.double(TokenKind::Ge),
            ('(', _) => TokenKind::LParen,
            (')', _) => TokenKind::RParen,
            ('[', _) => TokenKind::LBracket,
            (']', _) => TokenKind::RBracket,
            ('{', _) => TokenKind::LBrace,
            ('}', _) => TokenKind::RBrace,
            (',', _) => TokenKind::Comma,
            (':', _) => TokenKind::Colon,
            (';', _) => TokenKind::Semicolon,
            ('.', _) => TokenKind::Dot,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            ('=', _) => TokenKind::Assign,
            ('<', _) => TokenKind::Lt,
            ('>', _) => TokenKind::Gt,
            (other, _) => {
                return Err(self.error(line, column, format!("unexpected character '{}'", other)))
            }
        };
        Ok(token(kind))
    }

    fn double(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn number(&mut self) -> Result<Number, LexError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            text.push(c);
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                text.push(c);
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                for _ in 0..digit_at {
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                while let Some(c) = self.peek().filter(char::is_ascii_digit) {
                    text.push(c);
                    self.bump();
                }
            }
        }

        if is_float {
            text.parse::<f64>()
                .map(Number::F64)
                .map_err(|e| self.error(line, column, format!("invalid number '{}': {}", text, e)))
        } else if let Ok(n) = text.parse::<i64>() {
            Ok(Number::I64(n))
        } else {
            text.parse::<u64>()
                .map(Number::U64)
                .map_err(|_| self.error(line, column, format!("integer too large: {}", text)))
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LexError> {
        let (line, column) = (self.line, self.column);
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error(line, column, "unterminated string"));
            };
            match c {
                c if c == quote => return Ok(out),
                '\n' => return Err(self.error(line, column, "unterminated string")),
                '\\' => {
                    let (esc_line, esc_column) = (self.line, self.column);
                    let Some(esc) = self.bump() else {
                        return Err(self.error(line, column, "unterminated string"));
                    };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        '/' => out.push('/'),
                        '\\' | '\'' | '"' => out.push(esc),
                        'u' => out.push(self.unicode_escape(esc_line, esc_column)?),
                        other => {
                            return Err(self.error(
                                esc_line,
                                esc_column,
                                format!("unknown escape '\\{}'", other),
                            ))
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn hex4(&mut self, line: usize, column: usize) -> Result<u32, LexError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error(line, column, "invalid \\u escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn unicode_escape(&mut self, line: usize, column: usize) -> Result<char, LexError> {
        let high = self.hex4(line, column)?;
        let code = if (0xD800..0xDC00).contains(&high) {
            // Surrogate pair, as written by JSON encoders.
            if self.peek() != Some('\\') || self.peek_at(1) != Some('u') {
                return Err(self.error(line, column, "unpaired surrogate in \\u escape"));
            }
            self.bump();
            self.bump();
            let low = self.hex4(line, column)?;
            if !(0xDC00..0xE000).contains(&low) {
                return Err(self.error(line, column, "invalid surrogate pair in \\u escape"));
            }
            0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
        } else {
            high
        };
        char::from_u32(code).ok_or_else(|| self.error(line, column, "invalid \\u escape"))
    }
}
