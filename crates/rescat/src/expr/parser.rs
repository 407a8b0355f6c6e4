//! Recursive-descent parser producing the expression AST.

use super::lexer::{tokenize, Token, TokenKind};
use super::ExpressionError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

/// Expression syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    /// Reference to a resource attribute.
    Name(String),
    List(Vec<Expr>),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// Whitelisted function call. Method syntax `x.f(a)` stores `x` as the
    /// receiver, which becomes the first argument.
    Call {
        function: String,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CompareOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in"];

/// Deepest syntax tree the parser builds. Every bracket, call, unary
/// operator and chained binary operator adds a level.
pub(crate) const MAX_DEPTH: usize = 64;

/// Parses a complete expression.
pub(crate) fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input).map_err(|e| ExpressionError::Syntax {
        line: e.line,
        column: e.column,
        message: e.message,
    })?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    if parser.peek() == &TokenKind::Eof {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.expr()?;
    if parser.peek() != &TokenKind::Eof {
        let found = parser.peek().describe();
        return Err(parser.error(format!("unexpected {}", found)));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        // tokenize() guarantees a trailing Eof, and advance() never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &TokenKind {
        &self.current().kind
    }

    fn peek_next(&self) -> &TokenKind {
        let idx = (self.pos + 1).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if kind != TokenKind::Eof {
            self.pos += 1;
        }
        kind
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        let token = self.current();
        ExpressionError::Syntax {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        if self.peek() == &kind {
            self.advance();
            Ok(())
        } else {
            let found = self.peek().describe();
            Err(self.error(format!("expected {}, found {}", kind.describe(), found)))
        }
    }

    fn deeper(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error(format!(
                "expression nested more than {} levels deep",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    /// Runs `parse` one level deeper, restoring the depth afterwards.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        let base = self.depth;
        self.deeper()?;
        let result = parse(self);
        self.depth = base;
        result
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(name) if name == keyword)
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        self.nested(Self::or_expr)
    }

    fn or_expr(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.and_expr()?;
        while self.at_keyword("or") {
            self.advance();
            self.deeper()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.not_expr()?;
        while self.at_keyword("and") {
            self.advance();
            self.deeper()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.at_keyword("not") {
            self.advance();
            let inner = self.nested(Self::not_expr)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self.peek() {
            TokenKind::Eq => Some(CompareOp::Eq),
            TokenKind::Ne => Some(CompareOp::Ne),
            TokenKind::Lt => Some(CompareOp::Lt),
            TokenKind::Le => Some(CompareOp::Le),
            TokenKind::Gt => Some(CompareOp::Gt),
            TokenKind::Ge => Some(CompareOp::Ge),
            TokenKind::Ident(name) if name == "in" => Some(CompareOp::In),
            TokenKind::Ident(name)
                if name == "not"
                    && matches!(self.peek_next(), TokenKind::Ident(next) if next == "in") =>
            {
                Some(CompareOp::NotIn)
            }
            _ => None,
        }
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let first = self.additive()?;
        let mut rest = Vec::new();
        while let Some(op) = self.compare_op() {
            self.advance();
            if op == CompareOp::NotIn {
                self.advance();
            }
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.deeper()?;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => {
                    self.depth = base;
                    return Ok(left);
                }
            };
            self.advance();
            self.deeper()?;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek() == &TokenKind::Minus {
            self.advance();
            let inner = self.nested(Self::unary)?;
            // Fold negative literals so `-1` is a plain number.
            return Ok(match inner {
                Expr::Literal(Value::Number(n)) => match super::eval::negate(n) {
                    Some(neg) => Expr::Literal(Value::Number(neg)),
                    None => Expr::Neg(Box::new(Expr::Literal(Value::Number(n)))),
                },
                other => Expr::Neg(Box::new(other)),
            });
        }
        if self.peek() == &TokenKind::Plus {
            self.advance();
            return self.nested(Self::unary);
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    self.deeper()?;
                    let name = self.identifier()?;
                    if self.peek() == &TokenKind::LParen {
                        let args = self.call_args()?;
                        expr = Expr::Call {
                            function: name,
                            receiver: Some(Box::new(expr)),
                            args,
                        };
                    } else {
                        expr = Expr::Attr(Box::new(expr), name);
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    self.deeper()?;
                    let index = self.expr()?;
                    self.expect(TokenKind::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::LParen => {
                    return Err(self.error("only named functions can be called"));
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    fn identifier(&mut self) -> Result<String, ExpressionError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected identifier, found {}", other.describe()))),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        self.expect(TokenKind::LParen)?;
        self.sequence(TokenKind::RParen)
    }

    /// Comma-separated expressions up to `close`, allowing a trailing comma.
    fn sequence(&mut self, close: TokenKind) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        loop {
            if self.peek() == &close {
                self.advance();
                return Ok(items);
            }
            items.push(self.expr()?);
            match self.peek() {
                TokenKind::Comma => {
                    self.advance();
                }
                kind if kind == &close => {}
                other => {
                    let found = other.describe();
                    return Err(self.error(format!(
                        "expected ',' or {}, found {}",
                        close.describe(),
                        found
                    )));
                }
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal(Value::Number(n)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Value::String(s)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                Ok(Expr::List(self.sequence(TokenKind::RBracket)?))
            }
            TokenKind::Ident(name) => {
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(self.error(format!("unexpected keyword '{}'", name)));
                }
                self.advance();
                if let Some(literal) = keyword_literal(&name) {
                    return Ok(Expr::Literal(literal));
                }
                if self.peek() == &TokenKind::LParen {
                    let args = self.call_args()?;
                    return Ok(Expr::Call {
                        function: name,
                        receiver: None,
                        args,
                    });
                }
                Ok(Expr::Name(name))
            }
            other => Err(self.error(format!("unexpected {}", other.describe()))),
        }
    }
}

/// Literal keywords shared with the source-form reader.
pub(crate) fn keyword_literal(name: &str) -> Option<Value> {
    match name {
        "True" | "true" => Some(Value::Bool(true)),
        "False" | "false" => Some(Value::Bool(false)),
        "None" | "null" => Some(Value::Null),
        _ => None,
    }
}
