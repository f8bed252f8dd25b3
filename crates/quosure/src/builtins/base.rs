use super::expect_table;
use crate::error::EvalError;
use crate::evaluator::{CallArguments, Interpreter};
use crate::parser::{DOTS, Expr};
use crate::quosure::Quosures;
use crate::table::{OrderKey, ROW_COUNT};
use crate::value::{Builtin, Formula, Value, ops};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "<-", call: assign },
    Builtin { name: "~", call: formula },
    Builtin { name: "+", call: add },
    Builtin { name: "-", call: subtract },
    Builtin { name: "*", call: multiply },
    Builtin { name: "/", call: divide },
    Builtin { name: "^", call: power },
    Builtin { name: "==", call: equal },
    Builtin { name: "!=", call: not_equal },
    Builtin { name: "<", call: less },
    Builtin { name: "<=", call: less_or_equal },
    Builtin { name: ">", call: greater },
    Builtin { name: ">=", call: greater_or_equal },
    Builtin { name: "&", call: and },
    Builtin { name: "|", call: or },
    Builtin { name: "!", call: not },
    Builtin { name: "c", call: combine },
    Builtin { name: "list", call: list },
    Builtin { name: "length", call: length },
    Builtin { name: "paste", call: paste },
    Builtin { name: "paste0", call: paste0 },
    Builtin { name: "sum", call: sum },
    Builtin { name: "mean", call: mean },
    Builtin { name: "min", call: min },
    Builtin { name: "max", call: max },
    Builtin { name: "n", call: n },
    Builtin { name: "nrow", call: nrow },
    Builtin { name: "names", call: names },
    Builtin { name: "seq_len", call: seq_len },
    Builtin { name: "if_else", call: if_else },
    Builtin { name: "desc", call: desc },
    Builtin { name: "identity", call: identity },
    Builtin { name: "is.null", call: is_null },
];

fn binary(
    interpreter: &mut Interpreter,
    call: &CallArguments,
) -> Result<(Value, Value), EvalError> {
    call.expect_count(2..=2)?;
    let left = call.arguments[0].promise.force(interpreter)?;
    let right = call.arguments[1].promise.force(interpreter)?;
    Ok((left, right))
}

fn unary(interpreter: &mut Interpreter, call: &CallArguments) -> Result<Value, EvalError> {
    call.expect_count(1..=1)?;
    call.arguments[0].promise.force(interpreter)
}

/// `name <- value` binds in the environment the call was evaluated in.
fn assign(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    call.expect_count(2..=2)?;
    let name = match call.arguments[0].promise.expr() {
        Expr::Symbol(name) | Expr::Literal(Value::Text(name)) => name.clone(),
        target => {
            return Err(EvalError::InvalidName {
                expr: target.to_string(),
                reason: "an assignment target must be a name".to_string(),
            });
        }
    };
    let value = call.arguments[1].promise.force(interpreter)?;
    call.env.set_value(name, value.clone());
    Ok(value)
}

fn formula(_: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    call.expect_count(1..=2)?;
    let mut sides = call.arguments.iter().map(|argument| argument.promise.expr().clone());
    let (lhs, rhs) = match (sides.next(), sides.next()) {
        (Some(rhs), None) => (None, rhs),
        (Some(lhs), Some(rhs)) => (Some(lhs), rhs),
        _ => return Err(EvalError::unbound("~")),
    };
    Ok(Value::Formula(Arc::new(Formula {
        lhs,
        rhs,
        env: call.env.clone(),
    })))
}

fn add(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::arithmetic("+", &left, &right)
}

fn subtract(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    if call.len() == 1 {
        return ops::negate(&unary(interpreter, &call)?);
    }
    let (left, right) = binary(interpreter, &call)?;
    ops::arithmetic("-", &left, &right)
}

fn multiply(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::arithmetic("*", &left, &right)
}

fn divide(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::arithmetic("/", &left, &right)
}

fn power(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::arithmetic("^", &left, &right)
}

fn equal(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::compare("==", &left, &right)
}

fn not_equal(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::compare("!=", &left, &right)
}

fn less(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::compare("<", &left, &right)
}

fn less_or_equal(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::compare("<=", &left, &right)
}

fn greater(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::compare(">", &left, &right)
}

fn greater_or_equal(
    interpreter: &mut Interpreter,
    call: CallArguments,
) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::compare(">=", &left, &right)
}

fn and(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::and(&left, &right)
}

fn or(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (left, right) = binary(interpreter, &call)?;
    ops::or(&left, &right)
}

fn not(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    ops::not(&unary(interpreter, &call)?)
}

/// `c(...)`: flattens vectors, or concatenates quosures when every
/// argument is one.
fn combine(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let values = call.force_all(interpreter)?;
    let all_quosures = !values.is_empty()
        && values
            .iter()
            .all(|value| matches!(value, Value::Quosure(_) | Value::Quosures(_)));
    if all_quosures {
        let mut quosures = Quosures::new();
        for (argument, value) in call.arguments.iter().zip(values) {
            match value {
                Value::Quosure(quosure) => quosures.push(argument.name.clone(), quosure),
                Value::Quosures(more) => {
                    for named in more.iter() {
                        quosures.push(named.name.clone(), named.quosure.clone());
                    }
                }
                _ => {}
            }
        }
        return Ok(Value::Quosures(quosures));
    }
    let items = values
        .iter()
        .flat_map(|value| value.elements().into_owned())
        .collect();
    Ok(Value::vector(items))
}

/// `list(...)`: keeps every argument as one element. A list of quosures
/// keeps the argument names.
fn list(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let values = call.force_all(interpreter)?;
    if !values.is_empty() && values.iter().all(|value| matches!(value, Value::Quosure(_))) {
        let mut quosures = Quosures::new();
        for (argument, value) in call.arguments.iter().zip(values) {
            if let Value::Quosure(quosure) = value {
                quosures.push(argument.name.clone(), quosure);
            }
        }
        return Ok(Value::Quosures(quosures));
    }
    Ok(Value::List(Arc::new(values)))
}

fn length(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = unary(interpreter, &call)?;
    let len = match &value {
        Value::Table(table) => table.column_names().count(),
        value => value.len(),
    };
    Ok(Value::Number(len as f64))
}

fn paste_with(
    interpreter: &mut Interpreter,
    call: &CallArguments,
    default_separator: &str,
) -> Result<Value, EvalError> {
    let matched = call.bind(&[DOTS, "sep"])?;
    let separator = match matched.optional(1) {
        Some(argument) => argument.promise.force(interpreter)?.to_text(),
        None => default_separator.to_string(),
    };
    let values = matched
        .dots
        .iter()
        .map(|argument| argument.promise.force(interpreter))
        .collect::<Result<Vec<_>, _>>()?;
    let columns: Vec<Vec<String>> = values
        .iter()
        .filter(|value| !value.is_empty())
        .map(|value| value.elements().iter().map(Value::to_text).collect())
        .collect();
    let len = columns.iter().map(Vec::len).max().unwrap_or(0);
    let items = (0..len)
        .map(|index| {
            let parts: Vec<&str> = columns
                .iter()
                .map(|column| column[index % column.len()].as_str())
                .collect();
            Value::from(parts.join(&separator))
        })
        .collect();
    Ok(Value::vector(items))
}

fn paste(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    paste_with(interpreter, &call, " ")
}

fn paste0(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    paste_with(interpreter, &call, "")
}

/// Numbers of every `...` argument, `None` when a missing value was found
/// and `na.rm` is not set.
fn aggregate_inputs(
    interpreter: &mut Interpreter,
    call: &CallArguments,
) -> Result<Option<Vec<f64>>, EvalError> {
    let matched = call.bind(&[DOTS, "na.rm"])?;
    let remove_missing = matched
        .force_or(interpreter, 1, Value::Logical(false))?
        .as_logical(&call.function)?
        .unwrap_or(false);
    let mut numbers = Vec::new();
    for argument in &matched.dots {
        let value = argument.promise.force(interpreter)?;
        for item in value.elements().iter() {
            match item.as_number(&call.function)? {
                Some(number) if !number.is_nan() => numbers.push(number),
                _ if remove_missing => {}
                _ => return Ok(None),
            }
        }
    }
    Ok(Some(numbers))
}

fn sum(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    Ok(aggregate_inputs(interpreter, &call)?
        .map_or(Value::Null, |numbers| Value::Number(numbers.iter().sum())))
}

fn mean(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    Ok(aggregate_inputs(interpreter, &call)?.map_or(Value::Null, |numbers| {
        Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
    }))
}

fn min(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    Ok(aggregate_inputs(interpreter, &call)?.map_or(Value::Null, |numbers| {
        Value::Number(numbers.into_iter().fold(f64::INFINITY, f64::min))
    }))
}

fn max(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    Ok(aggregate_inputs(interpreter, &call)?.map_or(Value::Null, |numbers| {
        Value::Number(numbers.into_iter().fold(f64::NEG_INFINITY, f64::max))
    }))
}

/// Row count of the current group inside a data verb.
fn n(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    call.expect_count(0..=0)?;
    interpreter
        .lookup_value(ROW_COUNT, &call.env)
        .map_err(|_| EvalError::type_mismatch("n", "to be called inside a data verb", "no data"))
}

fn nrow(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let table = expect_table("nrow", unary(interpreter, &call)?)?;
    Ok(Value::Number(table.rows() as f64))
}

fn names(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let table = expect_table("names", unary(interpreter, &call)?)?;
    let names = table
        .column_names()
        .map(|name| Value::Text(name.clone()))
        .collect();
    Ok(Value::List(Arc::new(names)))
}

fn seq_len(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let length = unary(interpreter, &call)?
        .as_number("seq_len")?
        .filter(|length| *length >= 0.0)
        .ok_or_else(|| EvalError::type_mismatch("seq_len", "a non-negative number", "NA"))?;
    let items = (1..=length as usize)
        .map(|index| Value::Number(index as f64))
        .collect();
    Ok(Value::vector(items))
}

/// Vectorised `if_else(condition, true, false, missing = NULL)`.
fn if_else(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let matched = call.bind(&["condition", "true", "false", "missing"])?;
    let condition = matched.force(interpreter, 0)?;
    let when_true = matched.force(interpreter, 1)?;
    let when_false = matched.force(interpreter, 2)?;
    let when_missing = matched.force_or(interpreter, 3, Value::Null)?;

    let condition = condition.cells();
    let when_true = when_true.cells();
    let when_false = when_false.cells();
    let when_missing = when_missing.cells();
    let len = [when_true.len(), when_false.len(), when_missing.len()]
        .into_iter()
        .try_fold(condition.len(), |len, other| {
            ops::recycled_len("if_else", len, other)
        })?;
    let items = (0..len)
        .map(|index| {
            let branch = match condition[index % condition.len()].as_logical("if_else")? {
                Some(true) => &when_true,
                Some(false) => &when_false,
                None => &when_missing,
            };
            Ok(branch[index % branch.len()].clone())
        })
        .collect::<Result<Vec<_>, EvalError>>()?;
    Ok(Value::vector(items))
}

/// Sort key that orders descending: negated numbers, negated dense ranks
/// for anything else. Missing values stay missing.
fn desc(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = unary(interpreter, &call)?;
    let items = value.elements();
    if items.iter().all(|item| matches!(item, Value::Number(_) | Value::Null)) {
        return ops::negate(&value);
    }
    let ranks: BTreeMap<OrderKey, usize> = items
        .iter()
        .map(OrderKey::of)
        .filter(|key| *key != OrderKey::Missing)
        .map(|key| (key, 0))
        .collect::<BTreeMap<_, _>>()
        .into_keys()
        .enumerate()
        .map(|(rank, key)| (key, rank))
        .collect();
    let negated = items
        .iter()
        .map(|item| {
            ranks
                .get(&OrderKey::of(item))
                .map_or(Value::Null, |rank| Value::Number(-(*rank as f64)))
        })
        .collect();
    Ok(Value::vector(negated))
}

fn identity(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    unary(interpreter, &call)
}

fn is_null(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    Ok(Value::Logical(matches!(unary(interpreter, &call)?, Value::Null)))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::{Error, EvalError};
    use crate::evaluator::Interpreter;
    use crate::value::Value;

    fn run(code: &str) -> Result<Value, Error> {
        Interpreter::new(Config::default()).eval_source(code)
    }

    #[test]
    fn test_vectors_and_aggregates() {
        assert_eq!(run("sum(c(1, 2, 3))").unwrap(), Value::Number(6.0));
        assert_eq!(run("mean(c(1, 2, 3, 6))").unwrap(), Value::Number(3.0));
        assert_eq!(run("max(c(1, NULL, 3))").unwrap(), Value::Number(3.0));
        assert_eq!(run("length(c(1, c(2, 3)))").unwrap(), Value::Number(3.0));
        assert_eq!(run("seq_len(3) * 2").unwrap(), Value::from(vec![2.0, 4.0, 6.0]));
    }

    #[test]
    fn test_missing_values_need_na_rm() {
        assert_eq!(
            run("x <- c(1, 2); x <- if_else(x > 1, NULL, x); sum(x)").unwrap(),
            Value::Null
        );
        assert_eq!(
            run("x <- if_else(c(1, 2) > 1, NULL, c(1, 2)); sum(x, na.rm = TRUE)").unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_paste() {
        assert_eq!(run("paste0(\"mean_\", \"a\")").unwrap(), Value::from("mean_a"));
        assert_eq!(
            run("paste(\"x\", c(1, 2), sep = \"-\")").unwrap(),
            Value::from(vec!["x-1", "x-2"])
        );
    }

    #[test]
    fn test_desc_orders_text() {
        assert_eq!(
            run("desc(c(\"b\", \"a\", \"c\"))").unwrap(),
            Value::from(vec![-1.0, 0.0, -2.0])
        );
    }

    #[test]
    fn test_arity_and_type_errors() {
        let error = run("`+`(1)").unwrap_err();
        assert!(matches!(error, Error::Eval(EvalError::Arity { found: 1, .. })), "{error}");
        let error = run("\"a\" + 1").unwrap_err();
        assert!(matches!(error, Error::Eval(EvalError::TypeMismatch { .. })), "{error}");
        let error = run("n()").unwrap_err();
        assert!(matches!(error, Error::Eval(EvalError::TypeMismatch { .. })), "{error}");
    }

    #[test]
    fn test_c_of_quosures_concatenates() {
        let value = run("c(quo(a), quos(b, d = e))").unwrap();
        let Value::Quosures(quosures) = value else {
            panic!("expected quosures, got {value:?}");
        };
        assert_eq!(quosures.len(), 3);
        assert_eq!(quosures.get(2).and_then(|named| named.name.as_deref()), Some("d"));
    }
}
