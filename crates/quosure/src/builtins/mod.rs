//! Functions available in every interpreter's base environment.

use crate::environment::{Environment, PromisedArgument};
use crate::error::EvalError;
use crate::parser::Expr;
use crate::table::Table;
use crate::value::{Function, Value};
use std::sync::Arc;

mod base;
mod tidyeval;
mod verbs;

pub fn install(base: &Environment) {
    for builtin in base::BUILTINS
        .iter()
        .chain(tidyeval::BUILTINS)
        .chain(verbs::BUILTINS)
    {
        base.set_value(builtin.name, Value::Function(Function::Builtin(*builtin)));
    }
    log::trace!("installed {} builtins", base.names().len());
}

fn expect_table(function: &str, value: Value) -> Result<Arc<Table>, EvalError> {
    match value {
        Value::Table(table) => Ok(table),
        other => Err(EvalError::type_mismatch(
            function,
            "a tibble",
            other.type_name(),
        )),
    }
}

/// The syntax an argument was written as, looking through an inlined
/// quosure.
fn argument_expr(argument: &PromisedArgument) -> &Expr {
    match argument.promise.expr() {
        Expr::Quosure(quosure) => &quosure.expr,
        expr => expr,
    }
}

/// Output name of a verb argument: its name, or the label of its syntax.
fn argument_label(argument: &PromisedArgument) -> Arc<str> {
    argument
        .name
        .clone()
        .unwrap_or_else(|| argument.promise.expr().label().into())
}
