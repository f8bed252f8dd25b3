//! Deferred expressions for a small R-flavoured language.
//!
//! A [`Quosure`] pairs unevaluated syntax with the environment it was
//! written in. Quosures are created with `quo()`/`enquo()`, inlined into
//! other expressions with `!!`, spliced into argument lists with `!!!`, and
//! used to compute output names with `lhs := rhs`. The table verbs in the
//! base environment (`filter`, `mutate`, `summarise`, ...) evaluate their
//! arguments against the columns of a table.
//!
//! ```text
//! my_summarise <- function(df, group_var) {
//!     group_var <- enquo(group_var)
//!     df |> group_by(!!group_var) |> summarise(a = sum(a))
//! }
//! ```

mod builtins;
pub mod config;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod quosure;
pub mod substitute;
pub mod table;
pub mod value;

pub use config::{CaptureMode, Config};
pub use environment::{Binding, Environment, Promise, PromisedArgument};
pub use error::{Error, EvalError, Result};
pub use evaluator::{CallArguments, Interpreter};
pub use parser::{Argument, ArgumentName, Expr, Parameter, ParseFailure, parse};
pub use quosure::{
    NamedQuosure, Quosure, Quosures, capture_argument, capture_here, capture_promise,
    capture_variadic, combine, render_name,
};
pub use substitute::{substitute, substitute_and_eval};
pub use table::Table;
pub use value::Value;
