use crate::quosure::Quosure;
use crate::value::{Value, format_number};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// Name of the variadic parameter and of the symbol that forwards it.
pub const DOTS: &str = "...";

/// Owned syntax tree. Trees are immutable once parsed; substitution builds
/// new trees instead of editing them.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Symbol(Arc<str>),
    Literal(Value),
    Call {
        function: Box<Expr>,
        arguments: Vec<Argument>,
    },
    Function {
        parameters: Arc<[Parameter]>,
        body: Arc<Expr>,
    },
    Block(Vec<Expr>),
    /// `!!x`: replaced by the value of `x` during substitution.
    Unquote(Box<Expr>),
    /// `!!!x`: replaced by N sibling arguments during substitution.
    Splice(Box<Expr>),
    /// A quosure inlined by substitution. Its symbols resolve in the
    /// quosure's environment before the surrounding one.
    Quosure(Quosure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: ArgumentName,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentName {
    Positional,
    Fixed(Arc<str>),
    /// `lhs := value`, the name is computed from `lhs` during substitution.
    Target(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Arc<str>,
    pub default: Option<Expr>,
}

impl Argument {
    pub fn positional(value: Expr) -> Self {
        Self {
            name: ArgumentName::Positional,
            value,
        }
    }

    pub fn named(name: impl Into<Arc<str>>, value: Expr) -> Self {
        Self {
            name: ArgumentName::Fixed(name.into()),
            value,
        }
    }

    pub fn fixed_name(&self) -> Option<&str> {
        match &self.name {
            ArgumentName::Fixed(name) => Some(name),
            _ => None,
        }
    }
}

impl Expr {
    pub fn symbol(name: impl Into<Arc<str>>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn call(function: impl Into<Arc<str>>, arguments: impl IntoIterator<Item = Expr>) -> Self {
        Self::Call {
            function: Box::new(Self::symbol(function)),
            arguments: arguments.into_iter().map(Argument::positional).collect(),
        }
    }

    pub fn binary(operator: &str, left: Expr, right: Expr) -> Self {
        Self::call(operator, [left, right])
    }

    pub fn unary(operator: &str, operand: Expr) -> Self {
        Self::call(operator, [operand])
    }

    /// `lhs |> f(x)` becomes `f(lhs, x)`; a bare `lhs |> f` becomes `f(lhs)`.
    pub fn pipe(lhs: Expr, rhs: Expr) -> Self {
        match rhs {
            Self::Call {
                function,
                mut arguments,
            } => {
                arguments.insert(0, Argument::positional(lhs));
                Self::Call {
                    function,
                    arguments,
                }
            }
            function => Self::Call {
                function: Box::new(function),
                arguments: vec![Argument::positional(lhs)],
            },
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Canonical text for a captured expression: a symbol's name, a string
    /// literal's content, the deparse of anything else.
    pub fn label(&self) -> String {
        match self {
            Self::Symbol(name) => name.to_string(),
            Self::Literal(Value::Text(text)) => text.to_string(),
            Self::Quosure(quosure) => quosure.expr.label(),
            expr => expr.deparse(),
        }
    }

    /// Deparses without quosure markers.
    pub fn deparse(&self) -> String {
        Deparse {
            expr: self,
            marked: false,
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Associativity {
    Left,
    Right,
}

const ATOM: u8 = u8::MAX;

fn infix_operator(name: &str) -> Option<(u8, Associativity)> {
    use Associativity::*;
    Some(match name {
        "<-" => (1, Right),
        "~" => (2, Right),
        "|" => (3, Left),
        "&" => (4, Left),
        "==" | "!=" | "<" | "<=" | ">" | ">=" => (6, Left),
        "+" | "-" => (7, Left),
        "*" | "/" => (8, Left),
        "^" => (11, Right),
        _ => return None,
    })
}

fn prefix_operator(name: &str) -> Option<u8> {
    match name {
        "~" => Some(2),
        "!" => Some(5),
        "-" => Some(10),
        _ => None,
    }
}

enum Shape<'a> {
    Infix(&'a str, &'a Expr, &'a Expr),
    Prefix(&'a str, &'a Expr),
    Other,
}

fn shape(expr: &Expr) -> Shape<'_> {
    let Expr::Call {
        function,
        arguments,
    } = expr
    else {
        return Shape::Other;
    };
    let Some(operator) = function.as_symbol() else {
        return Shape::Other;
    };
    if arguments
        .iter()
        .any(|argument| argument.name != ArgumentName::Positional)
    {
        return Shape::Other;
    }
    match arguments.as_slice() {
        [left, right] if infix_operator(operator).is_some() => {
            Shape::Infix(operator, &left.value, &right.value)
        }
        [operand] if prefix_operator(operator).is_some() => Shape::Prefix(operator, &operand.value),
        _ => Shape::Other,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Function { .. } => 0,
        Expr::Unquote(_) | Expr::Splice(_) => 10,
        Expr::Quosure(quosure) => precedence(&quosure.expr),
        Expr::Literal(Value::Number(number)) if *number < 0.0 => 10,
        _ => match shape(expr) {
            Shape::Infix(operator, ..) => infix_operator(operator).map_or(ATOM, |(power, _)| power),
            Shape::Prefix(operator, _) => prefix_operator(operator).unwrap_or(ATOM),
            Shape::Other => ATOM,
        },
    }
}

pub(crate) fn is_syntactic(name: &str) -> bool {
    if name == DOTS {
        return true;
    }
    let mut characters = name.chars();
    let Some(first) = characters.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '.') {
        return false;
    }
    if first == '.' && name[1..].starts_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    characters.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !matches!(name, "function" | "TRUE" | "FALSE" | "NULL")
}

pub(crate) fn write_name(f: &mut fmt::Formatter, name: &str) -> fmt::Result {
    if is_syntactic(name) {
        f.write_str(name)
    } else {
        write!(f, "`{name}`")
    }
}

/// Writes a double-quoted string literal that lexes back to `text`.
fn write_text(f: &mut fmt::Formatter, text: &str) -> fmt::Result {
    f.write_char('"')?;
    for character in text.chars() {
        match character {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            character => f.write_char(character)?,
        }
    }
    f.write_char('"')
}

struct Deparse<'a> {
    expr: &'a Expr,
    marked: bool,
}

impl Deparse<'_> {
    fn child<'b>(&self, expr: &'b Expr) -> Deparse<'b> {
        Deparse {
            expr,
            marked: self.marked,
        }
    }

    fn write_operand(&self, f: &mut fmt::Formatter, expr: &Expr, parenthesize: bool) -> fmt::Result {
        if parenthesize {
            write!(f, "({})", self.child(expr))
        } else {
            write!(f, "{}", self.child(expr))
        }
    }

    fn write_arguments(&self, f: &mut fmt::Formatter, arguments: &[Argument]) -> fmt::Result {
        for (index, argument) in arguments.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            match &argument.name {
                ArgumentName::Positional => {}
                ArgumentName::Fixed(name) => {
                    write_name(f, name)?;
                    f.write_str(" = ")?;
                }
                ArgumentName::Target(target) => write!(f, "{} := ", self.child(target))?,
            }
            write!(f, "{}", self.child(&argument.value))?;
        }
        Ok(())
    }
}

impl fmt::Display for Deparse<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.expr {
            Expr::Symbol(name) => write_name(f, name),
            Expr::Literal(value) => value.fmt_literal(f),
            Expr::Unquote(operand) => {
                f.write_str("!!")?;
                self.write_operand(f, operand, precedence(operand) < 10)
            }
            Expr::Splice(operand) => {
                f.write_str("!!!")?;
                self.write_operand(f, operand, precedence(operand) < 10)
            }
            Expr::Quosure(quosure) => {
                if self.marked {
                    f.write_str("^")?;
                    self.write_operand(f, &quosure.expr, precedence(&quosure.expr) < ATOM)
                } else {
                    write!(f, "{}", self.child(&quosure.expr))
                }
            }
            Expr::Block(statements) => {
                f.write_str("{")?;
                for (index, statement) in statements.iter().enumerate() {
                    f.write_str(if index == 0 { " " } else { "; " })?;
                    write!(f, "{}", self.child(statement))?;
                }
                f.write_str(" }")
            }
            Expr::Function { parameters, body } => {
                f.write_str("function(")?;
                for (index, parameter) in parameters.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write_name(f, &parameter.name)?;
                    if let Some(default) = &parameter.default {
                        write!(f, " = {}", self.child(default))?;
                    }
                }
                write!(f, ") {}", self.child(body))
            }
            Expr::Call {
                function,
                arguments,
            } => match shape(self.expr) {
                Shape::Infix(operator, left, right) => {
                    let Some((power, associativity)) = infix_operator(operator) else {
                        return Ok(());
                    };
                    let left_power = precedence(left);
                    // A function literal reaches to the end of the expression,
                    // so it only needs brackets on the left.
                    let right_power = match right {
                        Expr::Function { .. } => ATOM,
                        right => precedence(right),
                    };
                    self.write_operand(
                        f,
                        left,
                        left_power < power
                            || (left_power == power && associativity == Associativity::Right),
                    )?;
                    if operator == "^" {
                        f.write_str("^")?;
                    } else {
                        write!(f, " {operator} ")?;
                    }
                    self.write_operand(
                        f,
                        right,
                        right_power < power
                            || (right_power == power && associativity == Associativity::Left),
                    )
                }
                Shape::Prefix(operator, operand) => {
                    let power = prefix_operator(operator).unwrap_or(ATOM);
                    f.write_str(operator)?;
                    self.write_operand(f, operand, precedence(operand) < power)
                }
                Shape::Other => {
                    self.write_operand(f, function, precedence(function) < ATOM)?;
                    f.write_str("(")?;
                    self.write_arguments(f, arguments)?;
                    f.write_str(")")
                }
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Deparse {
            expr: self,
            marked: true,
        }
        .fmt(f)
    }
}

impl Value {
    /// Writes the value the way it would be typed as a literal.
    pub(crate) fn fmt_literal(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Logical(true) => f.write_str("TRUE"),
            Value::Logical(false) => f.write_str("FALSE"),
            Value::Number(number) => f.write_str(&format_number(*number)),
            Value::Text(text) => write_text(f, text),
            Value::Symbol(name) => write_name(f, name),
            Value::List(items) => {
                f.write_str("c(")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_literal(f)?;
                }
                f.write_str(")")
            }
            Value::Quosure(quosure) => write!(f, "^{}", quosure.expr),
            Value::Formula(formula) => write!(f, "{formula}"),
            Value::Quosures(_) => f.write_str("<quosures>"),
            Value::Table(_) => f.write_str("<tibble>"),
            Value::Function(_) => f.write_str("<function>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deparse_minimal_parentheses() {
        let sum = Expr::binary("+", Expr::symbol("a"), Expr::symbol("b"));
        let product = Expr::binary("*", sum.clone(), Expr::literal(2.0));
        assert_eq!(product.deparse(), "(a + b) * 2");
        let difference = Expr::binary(
            "-",
            Expr::symbol("a"),
            Expr::binary("-", Expr::symbol("b"), Expr::symbol("c")),
        );
        assert_eq!(difference.deparse(), "a - (b - c)");
        let power = Expr::binary(
            "^",
            Expr::symbol("a"),
            Expr::binary("^", Expr::symbol("b"), Expr::symbol("c")),
        );
        assert_eq!(power.deparse(), "a^b^c");
        assert_eq!(Expr::unary("-", sum).deparse(), "-(a + b)");
    }

    #[test]
    fn test_deparse_calls_and_names() {
        let call = Expr::Call {
            function: Box::new(Expr::symbol("mean")),
            arguments: vec![
                Argument::positional(Expr::symbol("a")),
                Argument::named("na.rm", Expr::literal(true)),
                Argument::named("odd name", Expr::literal("x")),
            ],
        };
        assert_eq!(call.deparse(), "mean(a, na.rm = TRUE, `odd name` = \"x\")");
        assert_eq!(Expr::symbol("2x").deparse(), "`2x`");
        assert_eq!(Expr::literal(1.5).deparse(), "1.5");
        assert_eq!(Expr::literal(3.0).deparse(), "3");
    }

    #[test]
    fn test_label() {
        assert_eq!(Expr::symbol("a").label(), "a");
        assert_eq!(Expr::literal("mean_a").label(), "mean_a");
        assert_eq!(Expr::call("mean", [Expr::symbol("a")]).label(), "mean(a)");
    }

    #[test]
    fn test_pipe_inserts_first_argument() {
        let piped = Expr::pipe(
            Expr::symbol("df"),
            Expr::call("group_by", [Expr::symbol("g")]),
        );
        assert_eq!(piped.deparse(), "group_by(df, g)");
        assert_eq!(
            Expr::pipe(Expr::symbol("x"), Expr::symbol("f")).deparse(),
            "f(x)"
        );
    }
}
