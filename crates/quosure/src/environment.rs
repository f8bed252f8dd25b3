use crate::error::EvalError;
use crate::evaluator::Interpreter;
use crate::parser::Expr;
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};
use ulid::Ulid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// Builtin functions.
    Base,
    /// Top-level bindings of an interpreter.
    Global,
    /// A closure call frame.
    Local,
    /// Table columns visible to a verb's arguments.
    Mask,
    /// Evaluation frame of an inlined quosure.
    Overlay,
}

struct Frame {
    id: Ulid,
    kind: FrameKind,
    bindings: RwLock<IndexMap<Arc<str>, Binding>>,
    parent: Option<Environment>,
    /// Searched after the whole parent chain.
    fallback: Option<Environment>,
}

/// A shared, mutable frame of bindings and its enclosing frames.
#[derive(Clone)]
pub struct Environment(Arc<Frame>);

#[derive(Debug, Clone)]
pub enum Binding {
    Value(Value),
    Promise(Promise),
    Dots(Arc<[PromisedArgument]>),
    /// A parameter the caller left out and that has no default.
    Missing,
}

/// An unevaluated argument: its syntax, the caller's environment and the
/// value once forced.
#[derive(Clone)]
pub struct Promise(Arc<PromiseState>);

struct PromiseState {
    expr: Expr,
    env: Environment,
    value: OnceLock<Value>,
}

#[derive(Debug, Clone)]
pub struct PromisedArgument {
    pub name: Option<Arc<str>>,
    pub promise: Promise,
    /// Came from expanding the caller's `...` rather than from syntax
    /// written at this call.
    pub forwarded: bool,
}

impl Environment {
    fn with_frame(
        kind: FrameKind,
        bindings: IndexMap<Arc<str>, Binding>,
        parent: Option<Environment>,
        fallback: Option<Environment>,
    ) -> Self {
        Self(Arc::new(Frame {
            id: Ulid::new(),
            kind,
            bindings: RwLock::new(bindings),
            parent,
            fallback,
        }))
    }

    pub fn base() -> Self {
        Self::with_frame(FrameKind::Base, IndexMap::new(), None, None)
    }

    pub fn global(base: &Environment) -> Self {
        Self::with_frame(FrameKind::Global, IndexMap::new(), Some(base.clone()), None)
    }

    pub fn child(&self) -> Self {
        Self::with_frame(FrameKind::Local, IndexMap::new(), Some(self.clone()), None)
    }

    pub fn mask(&self, bindings: IndexMap<Arc<str>, Binding>) -> Self {
        Self::with_frame(FrameKind::Mask, bindings, Some(self.clone()), None)
    }

    /// A frame whose lookups try `self`'s chain first, then `fallback`'s.
    pub fn overlay(&self, fallback: &Environment) -> Self {
        Self::with_frame(
            FrameKind::Overlay,
            IndexMap::new(),
            Some(self.clone()),
            Some(fallback.clone()),
        )
    }

    pub fn define(&self, name: impl Into<Arc<str>>, binding: Binding) {
        self.0.bindings.write().insert(name.into(), binding);
    }

    pub fn set_value(&self, name: impl Into<Arc<str>>, value: Value) {
        self.define(name, Binding::Value(value));
    }

    pub fn get_local(&self, name: &str) -> Option<Binding> {
        self.0.bindings.read().get(name).cloned()
    }

    /// Resolves `name` through the frame, its parents, then the fallback.
    ///
    /// When an overlay delegates to its parent chain the base frame is
    /// skipped there, so builtins never shadow names the fallback binds.
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.find(name, false)
    }

    fn find(&self, name: &str, skip_base: bool) -> Option<Binding> {
        if skip_base && self.0.kind == FrameKind::Base {
            return None;
        }
        if let Some(binding) = self.get_local(name) {
            return Some(binding);
        }
        let skip_parent_base = skip_base || self.0.fallback.is_some();
        self.0
            .parent
            .as_ref()
            .and_then(|parent| parent.find(name, skip_parent_base))
            .or_else(|| {
                self.0
                    .fallback
                    .as_ref()
                    .and_then(|fallback| fallback.find(name, skip_base))
            })
    }

    /// The base frame at the root of this environment's chain.
    pub fn base_frame(&self) -> Option<Environment> {
        let mut current = self;
        loop {
            if current.0.kind == FrameKind::Base {
                return Some(current.clone());
            }
            current = current.0.parent.as_ref()?;
        }
    }

    /// Copies every frame of the chain except the base frame, so later
    /// assignments to the originals are not seen through the copy.
    pub fn snapshot(&self) -> Self {
        if self.0.kind == FrameKind::Base {
            return self.clone();
        }
        Self::with_frame(
            self.0.kind,
            self.0.bindings.read().clone(),
            self.0.parent.as_ref().map(Environment::snapshot),
            self.0.fallback.as_ref().map(Environment::snapshot),
        )
    }

    pub fn names(&self) -> Vec<Arc<str>> {
        self.0.bindings.read().keys().cloned().collect()
    }

    pub fn same(&self, other: &Environment) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.kind {
            FrameKind::Base => f.write_str("base"),
            FrameKind::Global => f.write_str("global"),
            _ => write!(f, "{}", self.0.id),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Environment({:?}, {self})", self.0.kind)
    }
}

impl Promise {
    pub fn new(expr: Expr, env: Environment) -> Self {
        Self(Arc::new(PromiseState {
            expr,
            env,
            value: OnceLock::new(),
        }))
    }

    /// A promise that is already forced, for arguments supplied by the host.
    pub fn evaluated(expr: Expr, env: Environment, value: Value) -> Self {
        let value = OnceLock::from(value);
        Self(Arc::new(PromiseState { expr, env, value }))
    }

    pub fn expr(&self) -> &Expr {
        &self.0.expr
    }

    pub fn env(&self) -> &Environment {
        &self.0.env
    }

    /// Evaluates the expression in the caller's environment at most once.
    pub fn force(&self, interpreter: &mut Interpreter) -> Result<Value, EvalError> {
        if let Some(value) = self.0.value.get() {
            return Ok(value.clone());
        }
        let value = interpreter.eval(&self.0.expr, &self.0.env)?;
        Ok(self.0.value.get_or_init(|| value).clone())
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Promise")
            .field("expr", &self.0.expr.to_string())
            .field("env", &self.0.env)
            .field("forced", &self.0.value.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(binding: Option<Binding>) -> Option<f64> {
        match binding {
            Some(Binding::Value(Value::Number(number))) => Some(number),
            _ => None,
        }
    }

    #[test]
    fn test_child_sees_parent_and_shadows() {
        let base = Environment::base();
        let global = Environment::global(&base);
        global.set_value("x", Value::Number(1.0));
        let local = global.child();
        assert_eq!(number(local.lookup("x")), Some(1.0));
        local.set_value("x", Value::Number(2.0));
        assert_eq!(number(local.lookup("x")), Some(2.0));
        assert_eq!(number(global.lookup("x")), Some(1.0));
        assert!(local.lookup("y").is_none());
    }

    #[test]
    fn test_overlay_prefers_own_chain_then_fallback_then_base() {
        let base = Environment::base();
        base.set_value("n", Value::Text("builtin".into()));
        let global = Environment::global(&base);
        global.set_value("x", Value::Number(1.0));
        let mut columns = IndexMap::new();
        columns.insert(Arc::from("x"), Binding::Value(Value::Number(10.0)));
        columns.insert(Arc::from("n"), Binding::Value(Value::Number(3.0)));
        columns.insert(Arc::from("y"), Binding::Value(Value::Number(20.0)));
        let mask = global.mask(columns);

        let overlay = global.overlay(&mask);
        assert_eq!(number(overlay.lookup("x")), Some(1.0));
        assert_eq!(number(overlay.lookup("y")), Some(20.0));
        assert_eq!(number(overlay.lookup("n")), Some(3.0));
        assert!(matches!(
            global.lookup("n"),
            Some(Binding::Value(Value::Text(_)))
        ));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let base = Environment::base();
        let global = Environment::global(&base);
        global.set_value("x", Value::Number(1.0));
        let copy = global.snapshot();
        global.set_value("x", Value::Number(2.0));
        assert_eq!(number(copy.lookup("x")), Some(1.0));
        assert!(copy.base_frame().is_some_and(|frame| frame.same(&base)));
        assert_eq!(copy.to_string(), "global");
    }
}
