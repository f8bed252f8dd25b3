use crate::environment::Environment;
use crate::error::EvalError;
use crate::evaluator::Interpreter;
use crate::parser::{Argument, ArgumentName, Expr};
use crate::value::Value;
use std::sync::Arc;

/// Rewrites `expr`, replacing every `!!x` by the value of `x` and expanding
/// `!!!x` and `lhs := value` in argument lists. Marker operands are
/// evaluated in `env`; nothing else is.
///
/// Function literals, blocks and inlined quosures are left untouched, so
/// substituting twice gives the same tree. A block's statements are
/// substituted one by one as they run, after the statements before them.
pub fn substitute(
    interpreter: &mut Interpreter,
    expr: &Expr,
    env: &Environment,
) -> Result<Expr, EvalError> {
    match expr {
        Expr::Symbol(_)
        | Expr::Literal(_)
        | Expr::Function { .. }
        | Expr::Block(_)
        | Expr::Quosure(_) => Ok(expr.clone()),
        Expr::Unquote(operand) => {
            let value = interpreter.eval(operand, env)?;
            let replacement = unquoted(value);
            if interpreter.config().trace_substitution {
                log::debug!("!!{operand} -> {replacement}");
            }
            Ok(replacement)
        }
        Expr::Splice(_) => Err(EvalError::InvalidSplice {
            expr: expr.to_string(),
            reason: "`!!!` can only be used as a call argument".to_string(),
        }),
        Expr::Call {
            function,
            arguments,
        } => Ok(Expr::Call {
            function: Box::new(substitute(interpreter, function, env)?),
            arguments: substitute_arguments(interpreter, arguments, env)?,
        }),
    }
}

/// Substitutes an argument list. Splices expand into zero or more sibling
/// arguments and name targets become fixed names.
pub fn substitute_arguments(
    interpreter: &mut Interpreter,
    arguments: &[Argument],
    env: &Environment,
) -> Result<Vec<Argument>, EvalError> {
    let mut substituted = Vec::with_capacity(arguments.len());
    for argument in arguments {
        if let Expr::Splice(operand) = &argument.value {
            if argument.name != ArgumentName::Positional {
                return Err(EvalError::InvalidSplice {
                    expr: argument.value.to_string(),
                    reason: "a spliced argument cannot be named".to_string(),
                });
            }
            let value = interpreter.eval(operand, env)?;
            let spliced = spliced(&argument.value, value)?;
            if interpreter.config().trace_substitution {
                log::debug!("!!!{operand} -> {} argument(s)", spliced.len());
            }
            substituted.extend(spliced);
            continue;
        }
        let name = match &argument.name {
            ArgumentName::Target(target) => {
                let name = resolve_target(interpreter, target, env)?;
                if interpreter.config().trace_substitution {
                    log::debug!("{target} := -> `{name}`");
                }
                ArgumentName::Fixed(name)
            }
            name => name.clone(),
        };
        substituted.push(Argument {
            name,
            value: substitute(interpreter, &argument.value, env)?,
        });
    }
    Ok(substituted)
}

/// Substitutes `expr` and evaluates the result once in `env`.
pub fn substitute_and_eval(
    interpreter: &mut Interpreter,
    expr: &Expr,
    env: &Environment,
) -> Result<Value, EvalError> {
    let substituted = substitute(interpreter, expr, env)?;
    interpreter.eval(&substituted, env)
}

/// Syntax standing for an unquoted value.
fn unquoted(value: Value) -> Expr {
    match value {
        Value::Quosure(quosure) => Expr::Quosure(quosure),
        Value::Symbol(name) => Expr::Symbol(name),
        value => Expr::Literal(value),
    }
}

fn spliced(marker: &Expr, value: Value) -> Result<Vec<Argument>, EvalError> {
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Quosures(quosures) => quosures
            .iter()
            .map(|named| Argument {
                name: named
                    .name
                    .clone()
                    .map_or(ArgumentName::Positional, ArgumentName::Fixed),
                value: Expr::Quosure(named.quosure.clone()),
            })
            .collect(),
        Value::List(items) => items
            .iter()
            .cloned()
            .map(|item| Argument::positional(unquoted(item)))
            .collect(),
        value @ (Value::Logical(_)
        | Value::Number(_)
        | Value::Text(_)
        | Value::Symbol(_)
        | Value::Quosure(_)) => vec![Argument::positional(unquoted(value))],
        other => {
            return Err(EvalError::InvalidSplice {
                expr: marker.to_string(),
                reason: format!("expected quosures or a vector, found {}", other.type_name()),
            });
        }
    })
}

/// The name a `lhs := value` argument binds: a bare symbol or string is
/// taken as written, anything else is evaluated and must give one string.
fn resolve_target(
    interpreter: &mut Interpreter,
    target: &Expr,
    env: &Environment,
) -> Result<Arc<str>, EvalError> {
    let value = match target {
        Expr::Symbol(name) => return Ok(name.clone()),
        Expr::Literal(Value::Text(text)) => return Ok(text.clone()),
        Expr::Unquote(operand) => interpreter.eval(operand, env)?,
        target => interpreter.eval(target, env)?,
    };
    value.as_name().ok_or_else(|| EvalError::InvalidName {
        expr: target.to_string(),
        reason: match value.len() {
            1 => format!("must evaluate to a string, found {}", value.type_name()),
            len => format!("must evaluate to a single string, found {len} values"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::parse;
    use crate::quosure::{Quosure, combine};

    fn setup() -> (Interpreter, Environment) {
        let interpreter = Interpreter::new(Config {
            trace_substitution: true,
            ..Config::default()
        });
        let global = interpreter.global().clone();
        (interpreter, global)
    }

    fn expr(code: &str) -> Expr {
        parse(code).unwrap().remove(0)
    }

    #[test]
    fn test_unquote_inlines_quosure_and_values() {
        let (mut interpreter, global) = setup();
        global.set_value("q", Quosure::new(Expr::symbol("a"), global.clone()).into());
        global.set_value("n", Value::Number(2.0));
        global.set_value("s", Value::Symbol("b".into()));
        let substituted = substitute(&mut interpreter, &expr("f(!!q, !!n, !!s)"), &global).unwrap();
        assert_eq!(substituted.to_string(), "f(^a, 2, b)");
        assert_eq!(substituted.deparse(), "f(a, 2, b)");
    }

    #[test]
    fn test_splice_expands_in_order() {
        let (mut interpreter, global) = setup();
        let quosures = combine(
            ["a", "b", "c"].map(|name| Quosure::new(Expr::symbol(name), global.clone())),
        );
        global.set_value("qs", Value::Quosures(quosures));
        global.set_value("none", Value::Quosures(combine([])));
        let substituted =
            substitute(&mut interpreter, &expr("f(x, !!!qs, y)"), &global).unwrap();
        assert_eq!(substituted.deparse(), "f(x, a, b, c, y)");
        let empty = substitute(&mut interpreter, &expr("f(!!!none)"), &global).unwrap();
        assert_eq!(empty.deparse(), "f()");
    }

    #[test]
    fn test_splice_outside_arguments_fails() {
        let (mut interpreter, global) = setup();
        global.set_value("x", Value::Null);
        assert!(matches!(
            substitute(&mut interpreter, &expr("!!!x"), &global),
            Err(EvalError::InvalidSplice { .. })
        ));
        global.set_value("t", crate::table::Table::default().into());
        assert!(matches!(
            substitute(&mut interpreter, &expr("g(!!!t)"), &global),
            Err(EvalError::InvalidSplice { .. })
        ));
    }

    #[test]
    fn test_name_targets() {
        let (mut interpreter, global) = setup();
        global.set_value("name", Value::from("mean_a"));
        global.set_value("names", Value::from(vec!["a", "b"]));
        let substituted =
            substitute(&mut interpreter, &expr("f(!!name := 1, plain := 2)"), &global).unwrap();
        assert_eq!(substituted.deparse(), "f(mean_a = 1, plain = 2)");
        assert!(matches!(
            substitute(&mut interpreter, &expr("f(!!names := 1)"), &global),
            Err(EvalError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_function_literals_are_not_substituted() {
        let (mut interpreter, global) = setup();
        let literal = expr("function(x) f(!!x)");
        assert_eq!(substitute(&mut interpreter, &literal, &global).unwrap(), literal);
    }

    #[test]
    fn test_blocks_wait_for_their_own_statements() {
        let (mut interpreter, global) = setup();
        let block = expr("{ q <- quo(a); f(!!q) }");
        assert_eq!(substitute(&mut interpreter, &block, &global).unwrap(), block);
    }
}
