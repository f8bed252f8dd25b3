//! Table verbs. Each verb receives its arguments already substituted and
//! evaluates them one group at a time in a data mask whose parent is the
//! environment the argument was written in.

use super::{argument_expr, argument_label, expect_table};
use crate::environment::{Binding, PromisedArgument};
use crate::error::EvalError;
use crate::evaluator::{CallArguments, Interpreter};
use crate::parser::{DOTS, Expr};
use crate::table::{OrderKey, Table};
use crate::value::{Builtin, Value};
use indexmap::IndexMap;
use std::sync::Arc;

pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "tibble", call: tibble },
    Builtin { name: "filter", call: filter },
    Builtin { name: "mutate", call: mutate },
    Builtin { name: "summarise", call: summarise },
    Builtin { name: "summarize", call: summarise },
    Builtin { name: "group_by", call: group_by },
    Builtin { name: "ungroup", call: ungroup },
    Builtin { name: "select", call: select },
    Builtin { name: "arrange", call: arrange },
    Builtin { name: "pull", call: pull },
    Builtin { name: "case_when", call: case_when },
];

/// Splits a verb call into its `.data` table and the remaining arguments.
fn verb_input(
    interpreter: &mut Interpreter,
    call: &CallArguments,
) -> Result<(Arc<Table>, Vec<PromisedArgument>), EvalError> {
    let matched = call.bind(&[".data", DOTS])?;
    let table = expect_table(&call.function, matched.force(interpreter, 0)?)?;
    Ok((table, matched.dots))
}

fn eval_in_mask(
    interpreter: &mut Interpreter,
    table: &Table,
    rows: &[usize],
    argument: &PromisedArgument,
) -> Result<Value, EvalError> {
    let mask = table.mask(rows, argument.promise.env());
    interpreter.eval(argument.promise.expr(), &mask)
}

/// Cells of `value` recycled to `size` rows.
fn fit(function: &str, value: &Value, size: usize) -> Result<Vec<Value>, EvalError> {
    let cells = value.cells();
    match cells.len() {
        len if len == size => Ok(cells.into_owned()),
        1 => Ok(vec![cells[0].clone(); size]),
        len => Err(EvalError::LengthMismatch {
            function: function.to_string(),
            left: len,
            right: size,
        }),
    }
}

fn tibble(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let mut columns: IndexMap<Arc<str>, Vec<Value>> = IndexMap::new();
    for argument in &call.arguments {
        let earlier = columns
            .iter()
            .map(|(name, values)| {
                let value = Value::vector(values.clone());
                (name.clone(), Binding::Value(value))
            })
            .collect();
        let scope = argument.promise.env().mask(earlier);
        let value = interpreter.eval(argument.promise.expr(), &scope)?;
        let name = argument_label(argument);
        if value.is_empty() {
            columns.shift_remove(&name);
        } else {
            columns.insert(name, value.elements().into_owned());
        }
    }
    let table = Table::from_columns(columns)?;
    log::debug!("tibble: {} x {}", table.rows(), table.column_names().count());
    Ok(table.into())
}

fn filter(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, conditions) = verb_input(interpreter, &call)?;
    let mut keep = vec![true; table.rows()];
    for group in table.partition()? {
        for condition in &conditions {
            let value = eval_in_mask(interpreter, &table, &group.rows, condition)?;
            let cells = fit("filter", &value, group.rows.len())?;
            for (row, cell) in group.rows.iter().zip(&cells) {
                keep[*row] &= cell.as_logical("filter")? == Some(true);
            }
        }
    }
    let rows: Vec<usize> = (0..table.rows()).filter(|row| keep[*row]).collect();
    log::debug!("filter: kept {} of {} rows", rows.len(), table.rows());
    Ok(table.take_rows(&rows).into())
}

/// Adds or replaces one column per argument, left to right, so every
/// argument sees the columns made by the ones before it.
fn mutate_columns(
    interpreter: &mut Interpreter,
    mut table: Table,
    arguments: &[PromisedArgument],
) -> Result<Table, EvalError> {
    let groups = table.partition()?;
    for argument in arguments {
        let name = argument_label(argument);
        if let Expr::Literal(Value::Null) = argument_expr(argument) {
            table = table.without_column(&name);
            continue;
        }
        let mut column = vec![Value::Null; table.rows()];
        for group in &groups {
            let value = eval_in_mask(interpreter, &table, &group.rows, argument)?;
            let cells = fit(&format!("mutate `{name}`"), &value, group.rows.len())?;
            for (row, cell) in group.rows.iter().zip(cells) {
                column[*row] = cell;
            }
        }
        log::trace!("mutate: column `{name}`");
        table = table.with_column(name, column)?;
    }
    Ok(table)
}

fn mutate(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, arguments) = verb_input(interpreter, &call)?;
    let table = mutate_columns(interpreter, (*table).clone(), &arguments)?;
    log::debug!("mutate: {} argument(s)", arguments.len());
    Ok(table.into())
}

/// One row per group: the group keys followed by one column per argument.
/// The result drops the last grouping level.
fn summarise(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, arguments) = verb_input(interpreter, &call)?;
    let groups = table.partition()?;
    let mut columns: IndexMap<Arc<str>, Vec<Value>> = table
        .groups()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let keys = groups.iter().map(|group| group.key[index].clone()).collect();
            (name.clone(), keys)
        })
        .collect();

    for group in &groups {
        let mut outputs: Vec<(Arc<str>, Value)> = Vec::with_capacity(arguments.len());
        for argument in &arguments {
            let mask = table.mask(&group.rows, argument.promise.env());
            for (name, value) in &outputs {
                mask.set_value(name.clone(), value.clone());
            }
            let value = interpreter.eval(argument.promise.expr(), &mask)?;
            let name = argument_label(argument);
            if value.cells().len() != 1 {
                return Err(EvalError::LengthMismatch {
                    function: format!("summarise `{name}`"),
                    left: value.len(),
                    right: 1,
                });
            }
            outputs.retain(|(earlier, _)| *earlier != name);
            outputs.push((name, value));
        }
        for (name, value) in outputs {
            columns.entry(name).or_default().push(value);
        }
    }

    let remaining = match table.groups() {
        [] => Vec::new(),
        [kept @ .., _] => kept.to_vec(),
    };
    let result = Table::from_columns(columns)?.group_by(remaining)?;
    log::debug!("summarise: {} group(s)", groups.len());
    Ok(result.into())
}

fn group_by(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, arguments) = verb_input(interpreter, &call)?;
    let mut names = Vec::with_capacity(arguments.len());
    let mut computed = Vec::new();
    for argument in arguments {
        let column = match argument_expr(&argument) {
            Expr::Symbol(name) if argument.name.is_none() && table.has_column(name) => {
                Some(name.clone())
            }
            _ => None,
        };
        match column {
            Some(name) => names.push(name),
            None => {
                names.push(argument_label(&argument));
                computed.push(argument);
            }
        }
    }
    let table = mutate_columns(interpreter, (*table).clone().ungroup(), &computed)?;
    log::debug!("group_by: {names:?}");
    Ok(table.group_by(names)?.into())
}

fn ungroup(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, _) = verb_input(interpreter, &call)?;
    Ok((*table).clone().ungroup().into())
}

fn column_symbol(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Quosure(quosure) => quosure.expr.as_symbol(),
        expr => expr.as_symbol(),
    }
}

/// Column names an evaluated selection stands for: names or 1-based
/// positions.
fn selected_names(table: &Table, value: &Value) -> Result<Vec<Arc<str>>, EvalError> {
    let columns: Vec<&Arc<str>> = table.column_names().collect();
    value
        .elements()
        .iter()
        .map(|item| match item {
            Value::Number(position) if *position >= 1.0 => columns
                .get(*position as usize - 1)
                .map(|name| (*name).clone())
                .ok_or_else(|| EvalError::ColumnNotFound {
                    name: format!("position {}", *position as usize),
                }),
            item => {
                let name = item.as_name().ok_or_else(|| {
                    EvalError::type_mismatch("select", "a column name", item.type_name())
                })?;
                table.column(&name)?;
                Ok(name)
            }
        })
        .collect()
}

fn select(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, arguments) = verb_input(interpreter, &call)?;
    let mut picked: Vec<(Arc<str>, Arc<str>)> = Vec::new();
    let mut dropped: Vec<Arc<str>> = Vec::new();
    for argument in &arguments {
        let (expr, negated) = match argument_expr(argument) {
            Expr::Call {
                function,
                arguments,
            } if function.as_symbol() == Some("-") && arguments.len() == 1 => {
                (&arguments[0].value, true)
            }
            expr => (expr, false),
        };
        let names = match column_symbol(expr) {
            Some(name) if table.has_column(name) => vec![Arc::from(name)],
            _ => {
                let value = interpreter.eval(expr, argument.promise.env())?;
                selected_names(&table, &value)?
            }
        };
        if negated {
            dropped.extend(names);
            continue;
        }
        match (&argument.name, names.as_slice()) {
            (Some(new), [old]) => picked.push((new.clone(), old.clone())),
            _ => picked.extend(names.into_iter().map(|name| (name.clone(), name))),
        }
    }
    if picked.is_empty() {
        picked = table
            .column_names()
            .map(|name| (name.clone(), name.clone()))
            .collect();
    }
    picked.retain(|(_, old)| !dropped.contains(old));
    let mut seen = Vec::new();
    picked.retain(|(new, _)| {
        let fresh = !seen.contains(new);
        seen.push(new.clone());
        fresh
    });
    log::debug!("select: {} column(s)", picked.len());
    Ok(table.select(&picked)?.into())
}

/// Stable sort over all rows, ignoring groups.
fn arrange(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let (table, arguments) = verb_input(interpreter, &call)?;
    let all_rows: Vec<usize> = (0..table.rows()).collect();
    let mut keys: Vec<Vec<OrderKey>> = Vec::with_capacity(arguments.len());
    for argument in &arguments {
        let value = eval_in_mask(interpreter, &table, &all_rows, argument)?;
        let cells = fit("arrange", &value, table.rows())?;
        keys.push(cells.iter().map(OrderKey::of).collect());
    }
    let mut order = all_rows;
    order.sort_by(|a, b| {
        keys.iter()
            .map(|key| key[*a].cmp(&key[*b]))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    log::debug!("arrange: {} key(s)", keys.len());
    Ok(table.take_rows(&order).into())
}

/// `pull(.data, var = -1)`: one column as a vector. Negative positions
/// count from the last column.
fn pull(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let matched = call.bind(&[".data", "var"])?;
    let table = expect_table("pull", matched.force(interpreter, 0)?)?;
    let columns: Vec<Arc<str>> = table.column_names().cloned().collect();
    let name = match matched.optional(1) {
        None => columns.last().cloned(),
        Some(argument) => match argument_expr(argument) {
            Expr::Symbol(name) if table.has_column(name) => Some(name.clone()),
            expr => match interpreter.eval(expr, argument.promise.env())? {
                Value::Number(position) if position < 0.0 => columns
                    .len()
                    .checked_sub(position.abs() as usize)
                    .and_then(|index| columns.get(index).cloned()),
                Value::Number(position) if position >= 1.0 => {
                    columns.get(position as usize - 1).cloned()
                }
                value => value.as_name(),
            },
        },
    };
    let name = name.ok_or_else(|| EvalError::ColumnNotFound {
        name: matched
            .optional(1)
            .map_or_else(String::new, |argument| argument.promise.expr().deparse()),
    })?;
    Ok(Value::vector(table.column(&name)?.to_vec()))
}

/// Vectorised chain of `condition ~ value` formulas; the first TRUE
/// condition wins, rows matching none are missing.
fn case_when(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let mut branches = Vec::with_capacity(call.len());
    for argument in &call.arguments {
        let formula = match argument.promise.force(interpreter)? {
            Value::Formula(formula) => formula,
            other => {
                return Err(EvalError::type_mismatch(
                    "case_when",
                    "a two-sided formula",
                    other.type_name(),
                ));
            }
        };
        let Some(lhs) = &formula.lhs else {
            return Err(EvalError::type_mismatch(
                "case_when",
                "a two-sided formula",
                "a one-sided formula",
            ));
        };
        let condition = interpreter.eval(lhs, &formula.env)?;
        let value = interpreter.eval(&formula.rhs, &formula.env)?;
        branches.push((condition.cells().into_owned(), value.cells().into_owned()));
    }
    let len = branches
        .iter()
        .flat_map(|(condition, value)| [condition.len(), value.len()])
        .filter(|len| *len != 1)
        .max()
        .unwrap_or(1);
    let mut items = Vec::with_capacity(len);
    for index in 0..len {
        let mut chosen = Value::Null;
        for (condition, value) in &branches {
            for part in [condition.len(), value.len()] {
                if part != 1 && part != len {
                    return Err(EvalError::LengthMismatch {
                        function: "case_when".to_string(),
                        left: part,
                        right: len,
                    });
                }
            }
            if condition[index % condition.len()].as_logical("case_when")? == Some(true) {
                chosen = value[index % value.len()].clone();
                break;
            }
        }
        items.push(chosen);
    }
    Ok(Value::vector(items))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::{Error, EvalError};
    use crate::evaluator::Interpreter;
    use crate::value::Value;
    use serde_json::json;

    const DATA: &str = "df <- tibble(g = c(\"x\", \"y\", \"x\"), a = c(1, 2, 3), b = c(10, 20, 30))\n";

    fn run(code: &str) -> Result<Value, Error> {
        Interpreter::new(Config::default()).eval_source(&format!("{DATA}{code}"))
    }

    fn json_of(code: &str) -> serde_json::Value {
        serde_json::to_value(run(code).unwrap()).unwrap()
    }

    #[test]
    fn test_tibble_sees_earlier_columns() {
        assert_eq!(
            json_of("tibble(x = c(1, 2), y = x * 2, z = 0)"),
            json!([{"x": 1, "y": 2, "z": 0}, {"x": 2, "y": 4, "z": 0}])
        );
    }

    #[test]
    fn test_filter_and_arrange() {
        assert_eq!(
            json_of("df |> filter(a > 1, g == \"x\")"),
            json!([{"g": "x", "a": 3, "b": 30}])
        );
        assert_eq!(
            json_of("df |> arrange(g, desc(a)) |> pull(a)"),
            json!([3, 1, 2])
        );
    }

    #[test]
    fn test_grouped_mutate_and_summarise() {
        assert_eq!(
            json_of("df |> group_by(g) |> mutate(share = a / sum(a), n = n()) |> pull(share)"),
            json!([0.25, 1, 0.75])
        );
        assert_eq!(
            json_of("df |> group_by(g) |> summarise(total = sum(a), twice = total * 2)"),
            json!([
                {"g": "x", "total": 4, "twice": 8},
                {"g": "y", "total": 2, "twice": 4}
            ])
        );
    }

    #[test]
    fn test_summarise_drops_last_group_level() {
        let value = run("df |> group_by(g, a) |> summarise(m = mean(b))").unwrap();
        let Value::Table(table) = value else {
            panic!("expected a table, got {value:?}");
        };
        assert_eq!(table.groups().len(), 1);
        assert_eq!(&*table.groups()[0], "g");
        assert_eq!(table.rows(), 3);
    }

    #[test]
    fn test_summarise_requires_single_value() {
        assert!(matches!(
            run("df |> summarise(all = a)"),
            Err(Error::Eval(EvalError::LengthMismatch { .. }))
        ));
    }

    #[test]
    fn test_select_pull_and_case_when() {
        assert_eq!(
            json_of("df |> select(value = a, g) |> filter(value < 2)"),
            json!([{"value": 1, "g": "x"}])
        );
        assert_eq!(
            json_of("df |> select(-b, -g)"),
            json!([{"a": 1}, {"a": 2}, {"a": 3}])
        );
        assert_eq!(json_of("pull(df, 1)"), json!(["x", "y", "x"]));
        assert_eq!(
            json_of("df |> mutate(size = case_when(a < 2 ~ \"small\", a < 3 ~ \"mid\")) |> pull(size)"),
            json!(["small", "mid", null])
        );
    }

    #[test]
    fn test_computed_group_and_missing_column() {
        assert_eq!(
            json_of("df |> group_by(big = a > 1) |> summarise(n = n())"),
            json!([{"big": false, "n": 1}, {"big": true, "n": 2}])
        );
        assert!(matches!(
            run("df |> mutate(c = nope + 1)"),
            Err(Error::Eval(EvalError::UnboundName { .. }))
        ));
        assert!(matches!(
            run("df |> mutate(c = c(1, 2))"),
            Err(Error::Eval(EvalError::LengthMismatch { .. }))
        ));
    }
}
