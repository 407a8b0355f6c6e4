//! Sandboxed expression language.
//!
//! Expressions are small formulas evaluated against one
//! [`Resource`]. Every attribute of the resource is bound under its own name;
//! `tags` is bound to the resource's [`TagSet`](crate::TagSet), so `tags.x`
//! is a membership test. Nothing outside the resource is reachable: there is
//! no variable assignment, no imports, and only a fixed set of pure
//! functions.
//!
//! # Syntax
//!
//! | Form | Example |
//! |------|---------|
//! | Literals | `1`, `2.5`, `'text'`, `"text"`, `True`, `None`, `[1, 2]` |
//! | Attributes | `path`, `meta.owner`, `tags.important`, `files[0]` |
//! | Arithmetic | `reads * 2`, `total / n`, `n // 2`, `n % 2`, `-x` |
//! | Comparison | `==`, `!=`, `<`, `<=`, `>`, `>=`, chained `1 < x < 5` |
//! | Membership | `'abc' in name`, `'x' not in tags`, `2 in sizes` |
//! | Logic | `a and b`, `a or b`, `not a` |
//! | Functions | `basename(path)`, `path.endswith('.bam')`, `has('path')` |
//!
//! # Missing attributes
//!
//! What happens when an expression names an attribute the resource lacks is
//! chosen per call with [`MissingPolicy`]. Under [`MissingPolicy::Default`]
//! the reference evaluates to null; null then propagates through arithmetic
//! and makes ordering comparisons false.
//!
//! ```
//! use rescat::{Expression, MissingPolicy, Resource, Value};
//!
//! let resource = Resource::new("s1").with("reads", 10).with_tags(["rna"]);
//! let expr = Expression::parse("reads * 2").unwrap();
//! assert_eq!(
//!     expr.evaluate(&resource, MissingPolicy::Default).unwrap(),
//!     Some(Value::from(20))
//! );
//!
//! let probe = Expression::parse("tags.dna or depth > 5").unwrap();
//! assert_eq!(
//!     probe.evaluate(&resource, MissingPolicy::Default).unwrap(),
//!     Some(Value::Bool(false))
//! );
//! assert_eq!(probe.evaluate(&resource, MissingPolicy::Skip).unwrap(), None);
//! ```

mod eval;
mod functions;
pub(crate) mod lexer;
mod parser;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::resource::Resource;
use crate::value::Value;

pub(crate) use parser::keyword_literal;

use eval::{Evaluator, Flow};
use parser::Expr;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Raised under [`MissingPolicy::Error`].
    #[error("no attribute '{0}'")]
    MissingAttribute(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {got}")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// How a reference to an absent attribute is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MissingPolicy {
    /// The reference evaluates to null.
    #[default]
    Default,
    /// The evaluation fails with [`ExpressionError::MissingAttribute`].
    Error,
    /// The resource is excluded from the result.
    Skip,
}

impl MissingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingPolicy::Default => "default",
            MissingPolicy::Error => "error",
            MissingPolicy::Skip => "skip",
        }
    }
}

impl FromStr for MissingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(MissingPolicy::Default),
            "error" => Ok(MissingPolicy::Error),
            "skip" => Ok(MissingPolicy::Skip),
            other => Err(format!(
                "unknown missing-attribute policy '{}' (expected default, error or skip)",
                other
            )),
        }
    }
}

impl fmt::Display for MissingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed expression, reusable across resources.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Expr,
}

impl Expression {
    /// Parses an expression. Unknown function names are rejected here rather
    /// than at evaluation time.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let ast = parser::parse(source)?;
        check_functions(&ast)?;
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    /// The text this expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against one resource.
    ///
    /// Returns `Ok(None)` when `policy` is [`MissingPolicy::Skip`] and the
    /// expression referenced an absent attribute.
    pub fn evaluate(
        &self,
        resource: &Resource,
        policy: MissingPolicy,
    ) -> Result<Option<Value>, ExpressionError> {
        match Evaluator::new(resource, policy).eval(&self.ast) {
            Ok(value) => Ok(Some(value)),
            Err(Flow::Skip) => Ok(None),
            Err(Flow::Error(err)) => Err(err),
        }
    }

    /// Evaluates with the `default` policy and reports truthiness.
    pub fn matches(&self, resource: &Resource) -> Result<bool, ExpressionError> {
        Ok(self
            .evaluate(resource, MissingPolicy::Default)?
            .is_some_and(|value| value.is_truthy()))
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expression::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn check_functions(expr: &Expr) -> Result<(), ExpressionError> {
    match expr {
        Expr::Literal(_) | Expr::Name(_) => Ok(()),
        Expr::List(items) => items.iter().try_for_each(check_functions),
        Expr::Attr(base, _) | Expr::Neg(base) | Expr::Not(base) => check_functions(base),
        Expr::Index(a, b) | Expr::Binary(_, a, b) | Expr::And(a, b) | Expr::Or(a, b) => {
            check_functions(a)?;
            check_functions(b)
        }
        Expr::Compare(first, rest) => {
            check_functions(first)?;
            rest.iter().try_for_each(|(_, e)| check_functions(e))
        }
        Expr::Call {
            function,
            receiver,
            args,
        } => {
            if !functions::is_known(function) {
                return Err(ExpressionError::UnknownFunction(function.clone()));
            }
            if let Some(receiver) = receiver {
                check_functions(receiver)?;
            }
            args.iter().try_for_each(check_functions)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Resource {
        Resource::new("a")
            .with("path", "/data/a.bam")
            .with("k", 3)
            .with("ratio", 0.5)
            .with("files", vec!["x.csv", "y.csv"])
            .with(
                "meta",
                Value::Map(vec![
                    ("owner".into(), "ann".into()),
                    ("lane".into(), 2.into()),
                ]),
            )
            .with_tags(["x", "important"])
    }

    fn eval(text: &str) -> Value {
        Expression::parse(text)
            .unwrap()
            .evaluate(&sample(), MissingPolicy::Default)
            .unwrap()
            .unwrap()
    }

    fn eval_err(text: &str) -> ExpressionError {
        Expression::parse(text)
            .unwrap()
            .evaluate(&sample(), MissingPolicy::Default)
            .unwrap_err()
    }

    #[test]
    fn tag_attribute_lookup() {
        assert_eq!(eval("tags.x"), Value::Bool(true));
        assert_eq!(eval("tags.y"), Value::Bool(false));
        assert_eq!(eval("'important' in tags"), Value::Bool(true));
        assert_eq!(eval("'y' not in tags"), Value::Bool(true));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("k + 1"), Value::from(4));
        assert_eq!(eval("k * ratio"), Value::from(1.5));
        assert_eq!(eval("k / 2"), Value::from(1.5));
        assert_eq!(eval("k // 2"), Value::from(1));
        assert_eq!(eval("-7 // 2"), Value::from(-4));
        assert_eq!(eval("7 // -2"), Value::from(-4));
        assert_eq!(eval("-7 % 3"), Value::from(2));
        assert_eq!(eval("7 % -3"), Value::from(-2));
        assert_eq!(eval("-k"), Value::from(-3));
        assert_eq!(eval("'ab' + 'cd'"), Value::from("abcd"));
        assert_eq!(eval("[1] + [2]"), Value::from(vec![1, 2]));
    }

    #[test]
    fn integer_overflow_falls_back_to_float() {
        assert_eq!(
            eval("9223372036854775807 + 1"),
            Value::from(9223372036854775808.0)
        );
    }

    #[test]
    fn division_by_zero() {
        assert!(matches!(eval_err("k / 0"), ExpressionError::DivisionByZero));
        assert!(matches!(eval_err("k % 0"), ExpressionError::DivisionByZero));
        assert!(matches!(eval_err("ratio // 0.0"), ExpressionError::DivisionByZero));
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("k == 3.0"), Value::Bool(true));
        assert_eq!(eval("1 < k < 5"), Value::Bool(true));
        assert_eq!(eval("1 < k < 2"), Value::Bool(false));
        assert_eq!(eval("path >= '/a'"), Value::Bool(true));
        assert!(matches!(eval_err("path < 3"), ExpressionError::Type(_)));
    }

    #[test]
    fn null_semantics() {
        assert_eq!(eval("missing"), Value::Null);
        assert_eq!(eval("missing + 1"), Value::Null);
        assert_eq!(eval("missing > 1"), Value::Bool(false));
        assert_eq!(eval("missing < 1"), Value::Bool(false));
        assert_eq!(eval("missing == None"), Value::Bool(true));
        assert_eq!(eval("missing.anything"), Value::Null);
        assert_eq!(eval("lower(missing)"), Value::Null);
    }

    #[test]
    fn logic_returns_operands() {
        assert_eq!(eval("missing or 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("k and path"), Value::from("/data/a.bam"));
        assert_eq!(eval("0 and missing_fn_arg"), Value::from(0));
        assert_eq!(eval("not tags.y"), Value::Bool(true));
    }

    #[test]
    fn membership() {
        assert_eq!(eval("'data' in path"), Value::Bool(true));
        assert_eq!(eval("'x.csv' in files"), Value::Bool(true));
        assert_eq!(eval("'owner' in meta"), Value::Bool(true));
        assert_eq!(eval("k in [1, 2, 3]"), Value::Bool(true));
        assert!(matches!(eval_err("1 in path"), ExpressionError::Type(_)));
    }

    #[test]
    fn nested_access() {
        assert_eq!(eval("meta.owner"), Value::from("ann"));
        assert_eq!(eval("meta['lane'] + 1"), Value::from(3));
        assert_eq!(eval("files[-1]"), Value::from("y.csv"));
        assert_eq!(eval("path[1]"), Value::from("d"));
        assert!(matches!(eval_err("files[5]"), ExpressionError::Type(_)));
        assert!(matches!(eval_err("k.x"), ExpressionError::Type(_)));
    }

    #[test]
    fn functions_and_methods() {
        assert_eq!(eval("basename(path)"), Value::from("a.bam"));
        assert_eq!(eval("path.endswith('.bam')"), Value::Bool(true));
        assert_eq!(eval("path.upper().lower()"), Value::from("/data/a.bam"));
        assert_eq!(eval("len(files)"), Value::from(2));
        assert_eq!(eval("str(k) + '!'"), Value::from("3!"));
        assert_eq!(eval("matches(name, '^a$')"), Value::Bool(true));
    }

    #[test]
    fn has_and_get_never_trigger_policy() {
        let r = sample();
        for policy in [MissingPolicy::Default, MissingPolicy::Error, MissingPolicy::Skip] {
            let has = Expression::parse("has('nope')").unwrap();
            assert_eq!(has.evaluate(&r, policy).unwrap(), Some(Value::Bool(false)));
            let get = Expression::parse("get('nope', 7)").unwrap();
            assert_eq!(get.evaluate(&r, policy).unwrap(), Some(Value::from(7)));
        }
        assert_eq!(eval("get('k')"), Value::from(3));
        assert_eq!(eval("get('nope')"), Value::Null);
    }

    #[test]
    fn missing_policies() {
        let r = Resource::new("b");
        let expr = Expression::parse("k").unwrap();
        assert_eq!(expr.evaluate(&r, MissingPolicy::Default).unwrap(), Some(Value::Null));
        assert_eq!(expr.evaluate(&r, MissingPolicy::Skip).unwrap(), None);
        assert!(matches!(
            expr.evaluate(&r, MissingPolicy::Error),
            Err(ExpressionError::MissingAttribute(name)) if name == "k"
        ));
    }

    #[test]
    fn missing_policy_applies_to_nested_keys() {
        let expr = Expression::parse("meta.absent").unwrap();
        assert_eq!(expr.evaluate(&sample(), MissingPolicy::Skip).unwrap(), None);
        assert!(matches!(
            expr.evaluate(&sample(), MissingPolicy::Error),
            Err(ExpressionError::MissingAttribute(_))
        ));
    }

    #[test]
    fn unknown_functions_fail_at_parse() {
        assert!(matches!(
            Expression::parse("__import__('os')"),
            Err(ExpressionError::UnknownFunction(_))
        ));
        assert!(matches!(
            Expression::parse("path.format()"),
            Err(ExpressionError::UnknownFunction(_))
        ));
    }

    #[test]
    fn matches_uses_truthiness() {
        let expr = Expression::parse("tags.important and k > 2").unwrap();
        assert!(expr.matches(&sample()).unwrap());
        assert!(!expr.matches(&Resource::new("z")).unwrap());
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!("skip".parse::<MissingPolicy>().unwrap(), MissingPolicy::Skip);
        assert_eq!("error".parse::<MissingPolicy>().unwrap(), MissingPolicy::Error);
        assert!("strict".parse::<MissingPolicy>().is_err());
        assert_eq!(MissingPolicy::default().to_string(), "default");
    }
}
