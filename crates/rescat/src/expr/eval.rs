//! Tree-walking evaluator.

use std::cmp::Ordering;

use super::functions;
use super::parser::{BinaryOp, CompareOp, Expr};
use super::{ExpressionError, MissingPolicy};
use crate::resource::Resource;
use crate::value::{Number, Value};

/// Non-value outcomes of evaluating a sub-expression.
#[derive(Debug)]
pub(crate) enum Flow {
    /// The `skip` policy met a missing attribute.
    Skip,
    Error(ExpressionError),
}

impl From<ExpressionError> for Flow {
    fn from(err: ExpressionError) -> Self {
        Flow::Error(err)
    }
}

pub(crate) type Outcome = std::result::Result<Value, Flow>;

/// Evaluation context: one resource and one missing-attribute policy.
pub(crate) struct Evaluator<'r> {
    resource: &'r Resource,
    policy: MissingPolicy,
}

impl<'r> Evaluator<'r> {
    pub(crate) fn new(resource: &'r Resource, policy: MissingPolicy) -> Self {
        Self { resource, policy }
    }

    fn missing(&self, attribute: &str) -> Outcome {
        match self.policy {
            MissingPolicy::Default => Ok(Value::Null),
            MissingPolicy::Error => Err(ExpressionError::MissingAttribute(attribute.to_string()).into()),
            MissingPolicy::Skip => Err(Flow::Skip),
        }
    }

    pub(crate) fn eval(&self, expr: &Expr) -> Outcome {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => match self.resource.lookup(name) {
                Some(value) => Ok(value.clone()),
                None => self.missing(name),
            },
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Attr(base, name) => {
                let base = self.eval(base)?;
                self.attribute(base, name)
            }
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                self.index(base, index)
            }
            Expr::Call {
                function,
                receiver,
                args,
            } => self.call(function, receiver.as_deref(), args),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Null => Ok(Value::Null),
                Value::Number(n) => Ok(Value::Number(
                    negate(n).unwrap_or_else(|| Number::F64(-n.to_f64())),
                )),
                other => Err(type_error(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
            Expr::Not(inner) => Ok(Value::Bool(!self.eval(inner)?.is_truthy())),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                Ok(arithmetic(*op, left, right)?)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
        }
    }

    fn attribute(&self, base: Value, name: &str) -> Outcome {
        match base {
            Value::Tags(tags) => Ok(Value::Bool(tags.attr(name))),
            Value::Map(entries) => match entries.into_iter().find(|(k, _)| k == name) {
                Some((_, value)) => Ok(value),
                None => self.missing(name),
            },
            Value::Null => Ok(Value::Null),
            other => Err(type_error(format!(
                "'{}' value has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    fn index(&self, base: Value, index: Value) -> Outcome {
        match (base, index) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::List(items), Value::Number(n)) => {
                let position = sequence_position(n, items.len())?;
                Ok(items.into_iter().nth(position).unwrap_or_default())
            }
            (Value::String(s), Value::Number(n)) => {
                let chars: Vec<char> = s.chars().collect();
                let position = sequence_position(n, chars.len())?;
                Ok(Value::String(chars[position].to_string()))
            }
            (Value::Map(entries), Value::String(key)) => {
                match entries.into_iter().find(|(k, _)| *k == key) {
                    Some((_, value)) => Ok(value),
                    None => self.missing(&key),
                }
            }
            (Value::Tags(tags), Value::String(tag)) => Ok(Value::Bool(tags.contains(&tag))),
            (base, index) => Err(type_error(format!(
                "'{}' value cannot be indexed by '{}'",
                base.type_name(),
                index.type_name()
            ))),
        }
    }

    fn call(&self, function: &str, receiver: Option<&Expr>, args: &[Expr]) -> Outcome {
        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(receiver) = receiver {
            values.push(self.eval(receiver)?);
        }
        for arg in args {
            values.push(self.eval(arg)?);
        }

        // These two read the resource itself and never trigger the policy.
        match function {
            "has" => {
                let [attribute] = functions::exact::<1>(function, values)?;
                let attribute = functions::string_arg(function, &attribute)?;
                Ok(Value::Bool(self.resource.contains_key(attribute)))
            }
            "get" => {
                if values.is_empty() || values.len() > 2 {
                    return Err(ExpressionError::Arity {
                        function: function.to_string(),
                        expected: "1 or 2",
                        got: values.len(),
                    }
                    .into());
                }
                let mut values = values.into_iter();
                let attribute = values.next().unwrap_or_default();
                let default = values.next().unwrap_or_default();
                let attribute = functions::string_arg(function, &attribute)?;
                Ok(self.resource.lookup(attribute).cloned().unwrap_or(default))
            }
            _ => Ok(functions::call(function, values)?),
        }
    }
}

fn type_error(message: String) -> Flow {
    Flow::Error(ExpressionError::Type(message))
}

/// Resolves a possibly negative index against a sequence length.
fn sequence_position(index: Number, len: usize) -> Result<usize, ExpressionError> {
    let index = index
        .as_i64()
        .ok_or_else(|| ExpressionError::Type("sequence index must be an integer".into()))?;
    let len_i = len as i64;
    let position = if index < 0 { index + len_i } else { index };
    if position < 0 || position >= len_i {
        return Err(ExpressionError::Type(format!("index {} out of range", index)));
    }
    Ok(position as usize)
}

/// Negates a number, returning `None` when an integer would overflow.
pub(crate) fn negate(n: Number) -> Option<Number> {
    match n {
        Number::I64(i) => i.checked_neg().map(Number::I64),
        Number::U64(u) => {
            if u == i64::MAX as u64 + 1 {
                Some(Number::I64(i64::MIN))
            } else {
                None
            }
        }
        Number::F64(f) => Some(Number::F64(-f)),
    }
}

fn arithmetic(op: BinaryOp, left: Value, right: Value) -> Result<Value, ExpressionError> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Number(a), Value::Number(b)) => numeric(op, a, b).map(Value::Number),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => Ok(Value::String(a + &b)),
        (Value::List(mut a), Value::List(b)) if op == BinaryOp::Add => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (left, right) => Err(ExpressionError::Type(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn numeric(op: BinaryOp, a: Number, b: Number) -> Result<Number, ExpressionError> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => None,
            BinaryOp::FloorDiv | BinaryOp::Mod => {
                if y == 0 {
                    return Err(ExpressionError::DivisionByZero);
                }
                // Floored: the remainder takes the divisor's sign.
                let quotient = x.checked_div_euclid(y);
                let remainder = x.checked_rem_euclid(y);
                match (quotient, remainder) {
                    (Some(q), Some(r)) if r != 0 && y < 0 => match op {
                        BinaryOp::FloorDiv => q.checked_sub(1),
                        _ => r.checked_add(y),
                    },
                    (Some(q), Some(r)) => Some(if op == BinaryOp::FloorDiv { q } else { r }),
                    _ => None,
                }
            }
        };
        if let Some(n) = exact {
            return Ok(Number::I64(n));
        }
    }

    let (x, y) = (a.to_f64(), b.to_f64());
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if y == 0.0 => {
            return Err(ExpressionError::DivisionByZero)
        }
        BinaryOp::Div => x / y,
        BinaryOp::FloorDiv => (x / y).floor(),
        BinaryOp::Mod => x - y * (x / y).floor(),
    };
    Ok(Number::F64(result))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Eq => Ok(left == right),
        CompareOp::Ne => Ok(left != right),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            if left.is_null() || right.is_null() {
                return Ok(false);
            }
            let ordering = left.partial_compare(right).ok_or_else(|| {
                ExpressionError::Type(format!(
                    "'{}' not supported between '{}' and '{}'",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Membership test for `item in container`.
fn contains(container: &Value, item: &Value) -> Result<bool, ExpressionError> {
    match (container, item) {
        (Value::Null, _) => Ok(false),
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::List(items), item) => Ok(items.contains(item)),
        (Value::Tags(tags), Value::String(tag)) => Ok(tags.contains(tag)),
        (Value::Tags(_), _) => Ok(false),
        (Value::Map(_), Value::String(key)) => Ok(container.get(key).is_some()),
        (container, item) => Err(ExpressionError::Type(format!(
            "'in <{}>' requires a different left operand than '{}'",
            container.type_name(),
            item.type_name()
        ))),
    }
}
