use crate::parser::ParseFailure;
use thiserror::Error;

/// Errors raised while capturing, substituting or evaluating expressions.
///
/// Every variant carries the offending sub-expression (deparsed) or name so
/// the message can point at what the caller wrote.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("cannot capture `{name}`: it is bound to an evaluated value, not to an argument")]
    Capture { name: String },

    #[error("object `{name}` not found")]
    UnboundName { name: String },

    #[error("cannot splice `{expr}`: {reason}")]
    InvalidSplice { expr: String, reason: String },

    #[error("invalid name target `{expr}`: {reason}")]
    InvalidName { expr: String, reason: String },

    #[error("{function}: expected {expected}, found {found}")]
    TypeMismatch {
        function: String,
        expected: String,
        found: String,
    },

    #[error("{function}: cannot recycle length {left} against length {right}")]
    LengthMismatch {
        function: String,
        left: usize,
        right: usize,
    },

    #[error("attempt to apply non-function `{expr}`")]
    NotCallable { expr: String },

    #[error("{function}: unused argument `{argument}`")]
    UnusedArgument { function: String, argument: String },

    #[error("{function}: expected {expected} arguments, found {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("argument `{name}` is missing, with no default")]
    MissingArgument { name: String },

    #[error("column `{name}` not found")]
    ColumnNotFound { name: String },

    #[error("evaluation nested deeper than {limit} calls")]
    DepthExceeded { limit: usize },
}

impl EvalError {
    pub fn type_mismatch(
        function: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            function: function.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        Self::UnboundName { name: name.into() }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let error = EvalError::InvalidName {
            expr: "c(\"a\", \"b\")".to_string(),
            reason: "must evaluate to a single string".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid name target `c(\"a\", \"b\")`: must evaluate to a single string"
        );
        assert_eq!(EvalError::unbound("z").to_string(), "object `z` not found");
    }
}
