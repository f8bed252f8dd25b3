use crate::config::CaptureMode;
use crate::environment::{Binding, Environment, Promise, PromisedArgument};
use crate::error::EvalError;
use crate::evaluator::Interpreter;
use crate::parser::Expr;
use crate::substitute::substitute;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Unevaluated syntax paired with the environment it was written in.
#[derive(Debug, Clone)]
pub struct Quosure {
    pub expr: Arc<Expr>,
    pub env: Environment,
}

impl Quosure {
    pub fn new(expr: Expr, env: Environment) -> Self {
        Self {
            expr: Arc::new(expr),
            env,
        }
    }
}

impl PartialEq for Quosure {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr && self.env.same(&other.env)
    }
}

impl fmt::Display for Quosure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<quosure>\nexpr: ^{}\nenv:  {}", self.expr, self.env)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedQuosure {
    pub name: Option<Arc<str>>,
    pub quosure: Quosure,
}

/// Ordered quosures, spliced as sibling arguments by `!!!`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Quosures(SmallVec<[NamedQuosure; 4]>);

impl Quosures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Option<Arc<str>>, quosure: Quosure) {
        self.0.push(NamedQuosure { name, quosure });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedQuosure> {
        self.0.iter()
    }

    pub fn get(&self, index: usize) -> Option<&NamedQuosure> {
        self.0.get(index)
    }
}

impl FromIterator<NamedQuosure> for Quosures {
    fn from_iter<T: IntoIterator<Item = NamedQuosure>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Quosures {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<list_of<quosure>>")?;
        for (index, named) in self.0.iter().enumerate() {
            match &named.name {
                Some(name) => write!(f, "\n\n${name}\n")?,
                None => write!(f, "\n\n[[{}]]\n", index + 1)?,
            }
            write!(f, "{}", named.quosure)?;
        }
        Ok(())
    }
}

fn captured_env(env: &Environment, mode: CaptureMode) -> Environment {
    match mode {
        CaptureMode::Live => env.clone(),
        CaptureMode::Snapshot => env.snapshot(),
    }
}

/// Wraps `expr` unless it already is an inlined quosure.
fn into_quosure(expr: &Expr, env: &Environment, mode: CaptureMode) -> Quosure {
    match expr {
        Expr::Quosure(quosure) => quosure.clone(),
        expr => Quosure::new(expr.clone(), captured_env(env, mode)),
    }
}

/// Captures syntax written at the current call site (`quo(expr)`).
///
/// Markers inside `expr` are substituted first, nothing else is evaluated.
pub fn capture_here(
    interpreter: &mut Interpreter,
    expr: &Expr,
    env: &Environment,
) -> Result<Quosure, EvalError> {
    let expr = substitute(interpreter, expr, env)?;
    let quosure = into_quosure(&expr, env, interpreter.config().capture_mode);
    log::debug!("captured {} in {}", quosure.expr, quosure.env);
    Ok(quosure)
}

/// Captures the syntax the caller supplied for parameter `name` together
/// with the caller's environment (`enquo(name)`).
pub fn capture_argument(
    interpreter: &Interpreter,
    name: &str,
    env: &Environment,
) -> Result<Quosure, EvalError> {
    match env.lookup(name) {
        Some(Binding::Promise(promise)) => {
            let quosure = into_quosure(
                promise.expr(),
                promise.env(),
                interpreter.config().capture_mode,
            );
            log::debug!("captured argument `{name}` as {} in {}", quosure.expr, quosure.env);
            Ok(quosure)
        }
        Some(Binding::Value(_) | Binding::Dots(_)) => Err(EvalError::Capture {
            name: name.to_string(),
        }),
        Some(Binding::Missing) => Err(EvalError::MissingArgument {
            name: name.to_string(),
        }),
        None => Err(EvalError::unbound(name)),
    }
}

/// The syntax and environment behind a promise, as a quosure.
pub fn capture_promise(interpreter: &Interpreter, promise: &Promise) -> Quosure {
    into_quosure(promise.expr(), promise.env(), interpreter.config().capture_mode)
}

/// Captures every argument of a call, keeping order and names (`quos(...)`).
pub fn capture_variadic(interpreter: &Interpreter, arguments: &[PromisedArgument]) -> Quosures {
    arguments
        .iter()
        .map(|argument| NamedQuosure {
            name: argument.name.clone(),
            quosure: capture_promise(interpreter, &argument.promise),
        })
        .collect()
}

/// Packages quosures for splicing. Order is preserved.
pub fn combine(quosures: impl IntoIterator<Item = Quosure>) -> Quosures {
    quosures
        .into_iter()
        .map(|quosure| NamedQuosure {
            name: None,
            quosure,
        })
        .collect()
}

/// Canonical text of a quosure's expression, used to build column names.
pub fn render_name(quosure: &Quosure) -> String {
    quosure.expr.label()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::value::Value;

    #[test]
    fn test_capture_here_keeps_syntax_and_env() {
        let mut interpreter = Interpreter::new(Config::default());
        let global = interpreter.global().clone();
        let quosure = capture_here(&mut interpreter, &Expr::symbol("a"), &global).unwrap();
        assert_eq!(render_name(&quosure), "a");
        assert!(quosure.env.same(&global));
        assert_eq!(quosure.to_string(), "<quosure>\nexpr: ^a\nenv:  global");
    }

    #[test]
    fn test_capture_argument_uses_promise_env() {
        let interpreter = Interpreter::new(Config::default());
        let caller = interpreter.global().clone();
        let local = caller.child();
        local.define(
            "x",
            Binding::Promise(Promise::new(Expr::symbol("a"), caller.clone())),
        );
        local.set_value("y", Value::Number(1.0));

        let quosure = capture_argument(&interpreter, "x", &local).unwrap();
        assert!(quosure.env.same(&caller));
        assert_eq!(*quosure.expr, Expr::symbol("a"));
        assert_eq!(
            capture_argument(&interpreter, "y", &local),
            Err(EvalError::Capture {
                name: "y".to_string()
            })
        );
        assert_eq!(
            capture_argument(&interpreter, "nope", &local),
            Err(EvalError::unbound("nope"))
        );
    }

    #[test]
    fn test_snapshot_mode_detaches_env() {
        let mut interpreter = Interpreter::new(Config {
            capture_mode: CaptureMode::Snapshot,
            ..Config::default()
        });
        let global = interpreter.global().clone();
        let quosure = capture_here(&mut interpreter, &Expr::symbol("a"), &global).unwrap();
        assert!(!quosure.env.same(&global));
    }

    #[test]
    fn test_combine_preserves_order() {
        let env = Interpreter::new(Config::default()).global().clone();
        let quosures = combine(
            ["a", "b", "c"].map(|name| Quosure::new(Expr::symbol(name), env.clone())),
        );
        let names: Vec<String> = quosures
            .iter()
            .map(|named| render_name(&named.quosure))
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(combine([]).is_empty());
    }
}
