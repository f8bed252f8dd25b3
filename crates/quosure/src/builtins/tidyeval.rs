//! Quoting and unquoting helpers: `quo()`, `enquo()`, `quos()`, `enquos()`
//! and friends.

use crate::environment::PromisedArgument;
use crate::error::EvalError;
use crate::evaluator::{CallArguments, Interpreter};
use crate::parser::Expr;
use crate::quosure::{
    Quosure, Quosures, capture_argument, capture_here, capture_promise,
    capture_variadic, render_name,
};
use crate::value::{Builtin, Value};
use std::sync::Arc;

pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "quo", call: quo },
    Builtin { name: "enquo", call: enquo },
    Builtin { name: "ensym", call: ensym },
    Builtin { name: "quos", call: quos },
    Builtin { name: "enquos", call: enquos },
    Builtin { name: "quo_name", call: quo_name },
    Builtin { name: "as_label", call: quo_name },
    Builtin { name: "quo_text", call: quo_text },
    Builtin { name: "quo_is_symbol", call: quo_is_symbol },
    Builtin { name: "is_quosure", call: is_quosure },
    Builtin { name: "sym", call: sym },
    Builtin { name: "syms", call: syms },
    Builtin { name: "eval_tidy", call: eval_tidy },
];

fn single(call: &CallArguments) -> Result<&PromisedArgument, EvalError> {
    call.expect_count(1..=1)?;
    Ok(&call.arguments[0])
}

fn quo(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let argument = single(&call)?;
    let quosure = capture_here(interpreter, argument.promise.expr(), argument.promise.env())?;
    Ok(Value::Quosure(quosure))
}

/// Parameter name written as the only argument of `enquo`/`ensym`.
fn parameter_name<'a>(function: &str, argument: &'a PromisedArgument) -> Result<&'a str, EvalError> {
    argument.promise.expr().as_symbol().ok_or_else(|| {
        EvalError::type_mismatch(
            function,
            "the name of a function argument",
            format!("`{}`", argument.promise.expr().deparse()),
        )
    })
}

fn enquo(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let argument = single(&call)?;
    let name = parameter_name("enquo", argument)?;
    Ok(Value::Quosure(capture_argument(
        interpreter,
        name,
        argument.promise.env(),
    )?))
}

fn ensym(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let argument = single(&call)?;
    let name = parameter_name("ensym", argument)?;
    let quosure = capture_argument(interpreter, name, argument.promise.env())?;
    match &*quosure.expr {
        Expr::Symbol(symbol) | Expr::Literal(Value::Text(symbol)) => Ok(Value::Symbol(symbol.clone())),
        expr => Err(EvalError::type_mismatch(
            "ensym",
            "a symbol or a string",
            format!("`{}`", expr.deparse()),
        )),
    }
}

fn quos(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    Ok(Value::Quosures(capture_variadic(interpreter, &call.arguments)))
}

/// Arguments forwarded through `...` are captured as the caller wrote them.
/// Any other argument must name a parameter of the calling function.
fn enquos(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let mut quosures = Quosures::new();
    for argument in &call.arguments {
        let quosure = if argument.forwarded {
            capture_promise(interpreter, &argument.promise)
        } else {
            let name = parameter_name("enquos", argument)?;
            capture_argument(interpreter, name, argument.promise.env())?
        };
        quosures.push(argument.name.clone(), quosure);
    }
    log::debug!("enquos captured {} argument(s)", quosures.len());
    Ok(Value::Quosures(quosures))
}

fn quo_name(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = single(&call)?.promise.force(interpreter)?;
    let name = match &value {
        Value::Quosure(quosure) => render_name(quosure),
        value => value.to_text(),
    };
    Ok(Value::from(name))
}

fn quo_text(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = single(&call)?.promise.force(interpreter)?;
    let text = match &value {
        Value::Quosure(quosure) => quosure.expr.deparse(),
        value => value.to_text(),
    };
    Ok(Value::from(text))
}

fn quo_is_symbol(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    match single(&call)?.promise.force(interpreter)? {
        Value::Quosure(quosure) => Ok(Value::Logical(quosure.expr.as_symbol().is_some())),
        other => Err(EvalError::type_mismatch(
            "quo_is_symbol",
            "a quosure",
            other.type_name(),
        )),
    }
}

fn is_quosure(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = single(&call)?.promise.force(interpreter)?;
    Ok(Value::Logical(matches!(value, Value::Quosure(_))))
}

fn symbol_of(function: &str, value: &Value) -> Result<Value, EvalError> {
    value
        .as_name()
        .map(Value::Symbol)
        .ok_or_else(|| EvalError::type_mismatch(function, "a string", value.type_name()))
}

fn sym(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = single(&call)?.promise.force(interpreter)?;
    symbol_of("sym", &value)
}

/// Always a list, so `!!!syms(x)` splices the same way for one name or many.
fn syms(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let value = single(&call)?.promise.force(interpreter)?;
    let symbols = value
        .elements()
        .iter()
        .map(|item| symbol_of("syms", item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::List(Arc::new(symbols)))
}

/// `eval_tidy(expr, data = NULL)`: evaluates a quosure, symbol or formula,
/// with the columns of `data` as the binding environment.
fn eval_tidy(interpreter: &mut Interpreter, call: CallArguments) -> Result<Value, EvalError> {
    let matched = call.bind(&["expr", "data"])?;
    let value = matched.force(interpreter, 0)?;
    let env = match matched.force_or(interpreter, 1, Value::Null)? {
        Value::Null => call.env.clone(),
        Value::Table(table) => {
            let rows: Vec<usize> = (0..table.rows()).collect();
            table.mask(&rows, &call.env)
        }
        other => {
            return Err(EvalError::type_mismatch(
                "eval_tidy",
                "a tibble or NULL as `data`",
                other.type_name(),
            ));
        }
    };
    match value {
        Value::Quosure(quosure) => interpreter.eval_quosure(&quosure, &env),
        Value::Symbol(name) => interpreter.lookup_value(&name, &env),
        Value::Formula(formula) => {
            let quosure = Quosure::new(formula.rhs.clone(), formula.env.clone());
            interpreter.eval_quosure(&quosure, &env)
        }
        value => Ok(value),
    }
}
