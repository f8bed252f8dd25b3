use crate::environment::Environment;
use crate::error::EvalError;
use crate::evaluator::{CallArguments, Interpreter};
use crate::parser::{Expr, Parameter};
use crate::quosure::{Quosure, Quosures};
use crate::table::Table;
use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Runtime values. Vectors are `List`s of scalars; `Null` inside a vector is
/// a missing value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Logical(bool),
    Number(f64),
    Text(Arc<str>),
    List(Arc<Vec<Value>>),
    Table(Arc<Table>),
    Symbol(Arc<str>),
    Quosure(Quosure),
    Quosures(Quosures),
    Formula(Arc<Formula>),
    Function(Function),
}

/// `lhs ~ rhs` together with the environment it was written in.
#[derive(Debug, Clone)]
pub struct Formula {
    pub lhs: Option<Expr>,
    pub rhs: Expr,
    pub env: Environment,
}

pub type BuiltinFn = fn(&mut Interpreter, CallArguments) -> Result<Value, EvalError>;

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub call: BuiltinFn,
}

#[derive(Debug)]
pub struct Closure {
    pub parameters: Arc<[Parameter]>,
    pub body: Arc<Expr>,
    pub env: Environment,
}

#[derive(Debug, Clone)]
pub enum Function {
    Builtin(Builtin),
    Closure(Arc<Closure>),
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// Formats a number the way it is printed and deparsed: integral values
/// without a fraction.
pub fn format_number(number: f64) -> String {
    if number.is_nan() {
        "NaN".to_string()
    } else if number.is_infinite() {
        if number > 0.0 { "Inf" } else { "-Inf" }.to_string()
    } else if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

impl Value {
    /// Collapses a single element to a scalar and no elements to `Null`.
    pub fn vector(mut items: Vec<Value>) -> Self {
        match items.len() {
            0 => Self::Null,
            1 => items.pop().unwrap_or(Self::Null),
            _ => Self::List(Arc::new(items)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Logical(_) => "logical",
            Self::Number(_) => "number",
            Self::Text(_) => "character",
            Self::List(_) => "vector",
            Self::Table(_) => "tibble",
            Self::Symbol(_) => "symbol",
            Self::Quosure(_) => "quosure",
            Self::Quosures(_) => "quosures",
            Self::Formula(_) => "formula",
            Self::Function(_) => "function",
        }
    }

    /// Number of elements: `NULL` is empty, a vector its length, anything
    /// else one.
    pub fn len(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::List(items) => items.len(),
            Self::Quosures(quosures) => quosures.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements of a vector, or the value itself as a single element.
    pub fn elements(&self) -> Cow<'_, [Value]> {
        match self {
            Self::List(items) => Cow::Borrowed(items.as_slice()),
            Self::Null => Cow::Borrowed(&[]),
            value => Cow::Owned(vec![value.clone()]),
        }
    }

    /// Elements for vectorised operations, where a bare `NULL` is one
    /// missing value.
    pub fn cells(&self) -> Cow<'_, [Value]> {
        match self {
            Self::Null => Cow::Owned(vec![Self::Null]),
            value => value.elements(),
        }
    }

    pub fn as_number(&self, function: &str) -> Result<Option<f64>, EvalError> {
        match self {
            Self::Number(number) => Ok(Some(*number)),
            Self::Logical(logical) => Ok(Some(if *logical { 1.0 } else { 0.0 })),
            Self::Null => Ok(None),
            other => Err(EvalError::type_mismatch(function, "a number", other.type_name())),
        }
    }

    pub fn as_logical(&self, function: &str) -> Result<Option<bool>, EvalError> {
        match self {
            Self::Logical(logical) => Ok(Some(*logical)),
            Self::Number(number) if number.is_nan() => Ok(None),
            Self::Number(number) => Ok(Some(*number != 0.0)),
            Self::Null => Ok(None),
            other => Err(EvalError::type_mismatch(function, "a logical", other.type_name())),
        }
    }

    /// Single string from a text or symbol value.
    pub fn as_name(&self) -> Option<Arc<str>> {
        match self {
            Self::Text(text) | Self::Symbol(text) => Some(text.clone()),
            Self::Quosure(quosure) => quosure.expr.as_symbol().map(Arc::from),
            _ => None,
        }
    }

    /// Text used by `paste` and when a value becomes a column label.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => "NA".to_string(),
            Self::Text(text) | Self::Symbol(text) => text.to_string(),
            Self::Number(number) => format_number(*number),
            Self::Logical(true) => "TRUE".to_string(),
            Self::Logical(false) => "FALSE".to_string(),
            Self::Quosure(quosure) => quosure.expr.label(),
            other => other.to_string(),
        }
    }
}

impl From<f64> for Value {
    fn from(number: f64) -> Self {
        Self::Number(number)
    }
}

impl From<bool> for Value {
    fn from(logical: bool) -> Self {
        Self::Logical(logical)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text.into())
    }
}

impl From<Quosure> for Value {
    fn from(quosure: Quosure) -> Self {
        Self::Quosure(quosure)
    }
}

impl From<Table> for Value {
    fn from(table: Table) -> Self {
        Self::Table(Arc::new(table))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(Arc::new(items.into_iter().map(Into::into).collect()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Logical(a), Self::Logical(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => a == b,
            (Self::Quosure(a), Self::Quosure(b)) => a == b,
            (Self::Quosures(a), Self::Quosures(b)) => a == b,
            (Self::Formula(a), Self::Formula(b)) => {
                a.lhs == b.lhs && a.rhs == b.rhs && a.env.same(&b.env)
            }
            (Self::Function(Function::Builtin(a)), Self::Function(Function::Builtin(b))) => {
                a.name == b.name
            }
            (Self::Function(Function::Closure(a)), Self::Function(Function::Closure(b))) => {
                Arc::ptr_eq(a, b)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.lhs {
            Some(lhs) => write!(f, "{}", Expr::binary("~", lhs.clone(), self.rhs.clone())),
            None => write!(f, "{}", Expr::unary("~", self.rhs.clone())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Table(table) => write!(f, "{table}"),
            Self::Quosure(quosure) => write!(f, "{quosure}"),
            Self::Quosures(quosures) => write!(f, "{quosures}"),
            Self::Function(Function::Builtin(builtin)) => write!(f, "<builtin {}>", builtin.name),
            Self::Function(Function::Closure(closure)) => write!(
                f,
                "{}",
                Expr::Function {
                    parameters: closure.parameters.clone(),
                    body: closure.body.clone(),
                }
            ),
            value => value.fmt_literal(f),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Logical(logical) => serializer.serialize_bool(*logical),
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                serializer.serialize_i64(*number as i64)
            }
            Self::Number(number) => serializer.serialize_f64(*number),
            Self::Text(text) | Self::Symbol(text) => serializer.serialize_str(text),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Table(table) => table.serialize(serializer),
            Self::Quosures(quosures) => {
                let mut seq = serializer.serialize_seq(Some(quosures.len()))?;
                for named in quosures.iter() {
                    seq.serialize_element(&named.quosure.expr.to_string())?;
                }
                seq.end()
            }
            Self::Quosure(quosure) => serializer.serialize_str(&quosure.expr.to_string()),
            other => serializer.collect_str(other),
        }
    }
}

/// Vectorised operators. Operands are recycled when one of them has a
/// single element; missing elements propagate.
pub mod ops {
    use super::Value;
    use crate::error::EvalError;
    use std::cmp::Ordering;

    pub fn recycled_len(function: &str, left: usize, right: usize) -> Result<usize, EvalError> {
        match (left, right) {
            (left, right) if left == right => Ok(left),
            (1, other) | (other, 1) => Ok(other),
            (left, right) => Err(EvalError::LengthMismatch {
                function: function.to_string(),
                left,
                right,
            }),
        }
    }

    fn zip_with(
        function: &str,
        left: &Value,
        right: &Value,
        mut combine: impl FnMut(&Value, &Value) -> Result<Value, EvalError>,
    ) -> Result<Value, EvalError> {
        let left = left.cells();
        let right = right.cells();
        let len = recycled_len(function, left.len(), right.len())?;
        let items = (0..len)
            .map(|index| combine(&left[index % left.len()], &right[index % right.len()]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::vector(items))
    }

    fn map(
        value: &Value,
        mut apply: impl FnMut(&Value) -> Result<Value, EvalError>,
    ) -> Result<Value, EvalError> {
        let items = value
            .cells()
            .iter()
            .map(&mut apply)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::vector(items))
    }

    pub fn arithmetic(operator: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
        zip_with(operator, left, right, |a, b| {
            let (Some(a), Some(b)) = (a.as_number(operator)?, b.as_number(operator)?) else {
                return Ok(Value::Null);
            };
            Ok(Value::Number(match operator {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                "^" => a.powf(b),
                _ => return Err(EvalError::unbound(operator)),
            }))
        })
    }

    pub fn compare(operator: &str, left: &Value, right: &Value) -> Result<Value, EvalError> {
        zip_with(operator, left, right, |a, b| {
            let ordering = match (a, b) {
                (Value::Null, _) | (_, Value::Null) => return Ok(Value::Null),
                (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
                (Value::Text(_), other) | (other, Value::Text(_)) => {
                    return Err(EvalError::type_mismatch(
                        operator,
                        "comparable operands",
                        other.type_name(),
                    ));
                }
                (a, b) => {
                    let (Some(a), Some(b)) = (a.as_number(operator)?, b.as_number(operator)?)
                    else {
                        return Ok(Value::Null);
                    };
                    a.partial_cmp(&b)
                }
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Null);
            };
            Ok(Value::Logical(match operator {
                "==" => ordering == Ordering::Equal,
                "!=" => ordering != Ordering::Equal,
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                ">=" => ordering != Ordering::Less,
                _ => return Err(EvalError::unbound(operator)),
            }))
        })
    }

    /// Three-valued `&`: FALSE wins over a missing value.
    pub fn and(left: &Value, right: &Value) -> Result<Value, EvalError> {
        zip_with("&", left, right, |a, b| {
            Ok(match (a.as_logical("&")?, b.as_logical("&")?) {
                (Some(false), _) | (_, Some(false)) => Value::Logical(false),
                (Some(true), Some(true)) => Value::Logical(true),
                _ => Value::Null,
            })
        })
    }

    /// Three-valued `|`: TRUE wins over a missing value.
    pub fn or(left: &Value, right: &Value) -> Result<Value, EvalError> {
        zip_with("|", left, right, |a, b| {
            Ok(match (a.as_logical("|")?, b.as_logical("|")?) {
                (Some(true), _) | (_, Some(true)) => Value::Logical(true),
                (Some(false), Some(false)) => Value::Logical(false),
                _ => Value::Null,
            })
        })
    }

    pub fn not(value: &Value) -> Result<Value, EvalError> {
        map(value, |item| {
            Ok(item
                .as_logical("!")?
                .map_or(Value::Null, |logical| Value::Logical(!logical)))
        })
    }

    pub fn negate(value: &Value) -> Result<Value, EvalError> {
        map(value, |item| {
            Ok(item
                .as_number("-")?
                .map_or(Value::Null, |number| Value::Number(-number)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(items: &[f64]) -> Value {
        Value::from(items.to_vec())
    }

    #[test]
    fn test_arithmetic_recycles_scalars() {
        let result = ops::arithmetic("+", &numbers(&[1.0, 2.0, 3.0]), &Value::Number(10.0)).unwrap();
        assert_eq!(result, numbers(&[11.0, 12.0, 13.0]));
        let error = ops::arithmetic("*", &numbers(&[1.0, 2.0]), &numbers(&[1.0, 2.0, 3.0]));
        assert_eq!(
            error,
            Err(EvalError::LengthMismatch {
                function: "*".to_string(),
                left: 2,
                right: 3
            })
        );
    }

    #[test]
    fn test_missing_values_propagate() {
        let with_missing = Value::from(vec![Value::Number(1.0), Value::Null]);
        let result = ops::compare(">", &with_missing, &Value::Number(0.0)).unwrap();
        assert_eq!(result, Value::from(vec![Value::Logical(true), Value::Null]));
        assert_eq!(
            ops::and(&Value::Null, &Value::Logical(false)).unwrap(),
            Value::Logical(false)
        );
        assert_eq!(
            ops::or(&Value::Null, &Value::Logical(false)).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_text_comparison_and_mismatch() {
        assert_eq!(
            ops::compare("<", &Value::from("a"), &Value::from("b")).unwrap(),
            Value::Logical(true)
        );
        assert!(matches!(
            ops::compare("==", &Value::from("a"), &Value::Number(1.0)),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_serialize_and_format() {
        let value = Value::from(vec![Value::Number(2.0), Value::Number(2.5), Value::Null]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[2,2.5,null]");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Inf");
        assert_eq!(Value::vector(vec![Value::Number(1.0)]), Value::Number(1.0));
        assert_eq!(Value::vector(Vec::new()), Value::Null);
    }
}
