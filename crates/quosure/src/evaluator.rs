use crate::builtins;
use crate::config::Config;
use crate::environment::{Binding, Environment, Promise, PromisedArgument};
use crate::error::{Error, EvalError};
use crate::parser::{Argument, DOTS, Expr, parse};
use crate::quosure::Quosure;
use crate::substitute::{substitute_and_eval, substitute_arguments};
use crate::value::{Closure, Function, Value};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Tree-walking evaluator owning the base and global environments.
pub struct Interpreter {
    config: Config,
    base: Environment,
    global: Environment,
    depth: usize,
}

/// Arguments of a call after substitution, as promises in the caller's
/// environment.
#[derive(Debug, Clone)]
pub struct CallArguments {
    pub function: Arc<str>,
    /// Environment the call was evaluated in.
    pub env: Environment,
    pub arguments: Vec<PromisedArgument>,
}

/// Arguments matched to a parameter list.
#[derive(Debug)]
pub struct MatchedArguments {
    function: Arc<str>,
    parameters: Vec<Arc<str>>,
    slots: Vec<Option<PromisedArgument>>,
    pub dots: Vec<PromisedArgument>,
}

impl Interpreter {
    pub fn new(config: Config) -> Self {
        let base = Environment::base();
        builtins::install(&base);
        let global = Environment::global(&base);
        Self {
            config,
            base,
            global,
            depth: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn global(&self) -> &Environment {
        &self.global
    }

    pub fn base(&self) -> &Environment {
        &self.base
    }

    /// Parses `source_code` and runs every statement in the global
    /// environment, returning the value of the last one.
    pub fn eval_source(&mut self, source_code: &str) -> Result<Value, Error> {
        let statements = parse(source_code)?;
        let global = self.global.clone();
        let mut last = Value::Null;
        for statement in &statements {
            last = substitute_and_eval(self, statement, &global)?;
        }
        Ok(last)
    }

    pub fn eval(&mut self, expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
        if self.depth >= self.config.max_depth {
            return Err(EvalError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        let result = self.eval_expr(expr, env);
        self.depth -= 1;
        result
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Environment) -> Result<Value, EvalError> {
        match expr {
            Expr::Symbol(name) => self.lookup_value(name, env),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Function { parameters, body } => {
                Ok(Value::Function(Function::Closure(Arc::new(Closure {
                    parameters: parameters.clone(),
                    body: body.clone(),
                    env: env.clone(),
                }))))
            }
            Expr::Block(statements) => {
                let mut last = Value::Null;
                for statement in statements {
                    last = self.eval(statement, env)?;
                }
                Ok(last)
            }
            Expr::Unquote(_) | Expr::Splice(_) => substitute_and_eval(self, expr, env),
            Expr::Quosure(quosure) => self.eval_quosure(quosure, env),
            Expr::Call {
                function,
                arguments,
            } => self.eval_call(function, arguments, env),
        }
    }

    /// Evaluates a quosure's expression: names resolve in the quosure's
    /// environment first, then in `env`.
    pub fn eval_quosure(&mut self, quosure: &Quosure, env: &Environment) -> Result<Value, EvalError> {
        let overlay = quosure.env.overlay(env);
        self.eval(&quosure.expr, &overlay)
    }

    pub fn lookup_value(&mut self, name: &str, env: &Environment) -> Result<Value, EvalError> {
        match env.lookup(name) {
            Some(Binding::Value(value)) => Ok(value),
            Some(Binding::Promise(promise)) => promise.force(self),
            Some(Binding::Dots(_)) => Err(EvalError::type_mismatch(
                DOTS,
                "use as a call argument",
                "a value context",
            )),
            Some(Binding::Missing) => Err(EvalError::MissingArgument {
                name: name.to_string(),
            }),
            None => Err(EvalError::unbound(name)),
        }
    }

    /// Resolves the function of a call. A symbol bound to a non-function
    /// value does not hide a builtin of the same name.
    fn resolve_function(&mut self, expr: &Expr, env: &Environment) -> Result<Function, EvalError> {
        let value = match expr {
            Expr::Symbol(name) => {
                let found = match env.lookup(name) {
                    Some(Binding::Value(value)) => Some(value),
                    Some(Binding::Promise(promise)) => Some(promise.force(self)?),
                    _ => None,
                };
                if let Some(Value::Function(function)) = &found {
                    return Ok(function.clone());
                }
                if let Some(Binding::Value(Value::Function(function))) = self.base.get_local(name) {
                    return Ok(function);
                }
                found.ok_or_else(|| EvalError::unbound(&**name))?
            }
            expr => self.eval(expr, env)?,
        };
        match value {
            Value::Function(function) => Ok(function),
            _ => Err(EvalError::NotCallable {
                expr: expr.to_string(),
            }),
        }
    }

    fn eval_call(
        &mut self,
        function_expr: &Expr,
        arguments: &[Argument],
        env: &Environment,
    ) -> Result<Value, EvalError> {
        let function = self.resolve_function(function_expr, env)?;
        let arguments = substitute_arguments(self, arguments, env)?;
        let arguments = promise_arguments(&arguments, env)?;
        let call = CallArguments {
            function: function_expr.deparse().into(),
            env: env.clone(),
            arguments,
        };
        self.apply(&function, call)
    }

    pub fn apply(&mut self, function: &Function, call: CallArguments) -> Result<Value, EvalError> {
        match function {
            Function::Builtin(builtin) => {
                log::trace!("calling builtin {}", builtin.name);
                (builtin.call)(self, call)
            }
            Function::Closure(closure) => self.apply_closure(closure, call),
        }
    }

    fn apply_closure(&mut self, closure: &Closure, call: CallArguments) -> Result<Value, EvalError> {
        let parameters: Vec<&str> = closure
            .parameters
            .iter()
            .map(|parameter| &*parameter.name)
            .collect();
        let matched = call.bind(&parameters)?;
        let frame = closure.env.child();
        let MatchedArguments {
            slots, mut dots, ..
        } = matched;
        for (parameter, slot) in closure.parameters.iter().zip(slots) {
            let binding = if &*parameter.name == DOTS {
                Binding::Dots(std::mem::take(&mut dots).into())
            } else {
                match (slot, &parameter.default) {
                    (Some(argument), _) => Binding::Promise(argument.promise),
                    (None, Some(default)) => {
                        Binding::Promise(Promise::new(default.clone(), frame.clone()))
                    }
                    (None, None) => Binding::Missing,
                }
            };
            frame.define(parameter.name.clone(), binding);
        }
        self.eval(&closure.body, &frame)
    }
}

/// Turns substituted arguments into promises. A `...` argument expands to
/// the promises bound to `...` in `env`.
fn promise_arguments(
    arguments: &[Argument],
    env: &Environment,
) -> Result<Vec<PromisedArgument>, EvalError> {
    let mut promised = Vec::with_capacity(arguments.len());
    for argument in arguments {
        let name = argument.fixed_name().map(Arc::from);
        if name.is_none() && argument.value.as_symbol() == Some(DOTS) {
            match env.lookup(DOTS) {
                Some(Binding::Dots(dots)) => {
                    promised.extend(dots.iter().map(|argument| PromisedArgument {
                        forwarded: true,
                        ..argument.clone()
                    }));
                    continue;
                }
                _ => return Err(EvalError::unbound(DOTS)),
            }
        }
        let promise = match &argument.value {
            Expr::Literal(value) => Promise::evaluated(argument.value.clone(), env.clone(), value.clone()),
            expr => Promise::new(expr.clone(), env.clone()),
        };
        promised.push(PromisedArgument {
            name,
            promise,
            forwarded: false,
        });
    }
    Ok(promised)
}

impl CallArguments {
    pub fn len(&self) -> usize {
        self.arguments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }

    pub fn expect_count(&self, expected: RangeInclusive<usize>) -> Result<(), EvalError> {
        if expected.contains(&self.arguments.len()) {
            return Ok(());
        }
        let (start, end) = expected.into_inner();
        Err(EvalError::Arity {
            function: self.function.to_string(),
            expected: if start == end {
                start.to_string()
            } else if end == usize::MAX {
                format!("at least {start}")
            } else {
                format!("{start} to {end}")
            },
            found: self.arguments.len(),
        })
    }

    /// Forces every argument in order.
    pub fn force_all(&self, interpreter: &mut Interpreter) -> Result<Vec<Value>, EvalError> {
        self.arguments
            .iter()
            .map(|argument| argument.promise.force(interpreter))
            .collect()
    }

    /// Matches arguments to `parameters`: exact names first, then positions
    /// up to `...`. Whatever is left goes to `...` when it is a parameter.
    pub fn bind(&self, parameters: &[&str]) -> Result<MatchedArguments, EvalError> {
        let mut slots: Vec<Option<PromisedArgument>> = vec![None; parameters.len()];
        let mut matched = vec![false; self.arguments.len()];
        let dots_index = parameters.iter().position(|parameter| *parameter == DOTS);

        for (index, argument) in self.arguments.iter().enumerate() {
            let Some(name) = &argument.name else {
                continue;
            };
            let position = parameters
                .iter()
                .position(|parameter| *parameter != DOTS && **parameter == **name);
            if let Some(position) = position {
                if slots[position].is_none() {
                    slots[position] = Some(argument.clone());
                    matched[index] = true;
                }
            }
        }

        let positional_limit = dots_index.unwrap_or(parameters.len());
        let mut next = 0;
        let mut dots = Vec::new();
        for (index, argument) in self.arguments.iter().enumerate() {
            if matched[index] {
                continue;
            }
            if argument.name.is_none() {
                while next < positional_limit && slots[next].is_some() {
                    next += 1;
                }
                if next < positional_limit {
                    slots[next] = Some(argument.clone());
                    continue;
                }
            }
            if dots_index.is_none() {
                return Err(EvalError::UnusedArgument {
                    function: self.function.to_string(),
                    argument: argument
                        .name
                        .as_deref()
                        .map_or_else(|| argument.promise.expr().to_string(), str::to_string),
                });
            }
            dots.push(argument.clone());
        }

        Ok(MatchedArguments {
            function: self.function.clone(),
            parameters: parameters.iter().map(|parameter| Arc::from(*parameter)).collect(),
            slots,
            dots,
        })
    }
}

impl MatchedArguments {
    pub fn optional(&self, index: usize) -> Option<&PromisedArgument> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn required(&self, index: usize) -> Result<&PromisedArgument, EvalError> {
        self.optional(index).ok_or_else(|| EvalError::MissingArgument {
            name: self
                .parameters
                .get(index)
                .map_or_else(|| self.function.to_string(), |name| name.to_string()),
        })
    }

    pub fn force(&self, interpreter: &mut Interpreter, index: usize) -> Result<Value, EvalError> {
        self.required(index)?.promise.force(interpreter)
    }

    pub fn force_or(
        &self,
        interpreter: &mut Interpreter,
        index: usize,
        default: Value,
    ) -> Result<Value, EvalError> {
        match self.optional(index) {
            Some(argument) => argument.promise.force(interpreter),
            None => Ok(default),
        }
    }
}
