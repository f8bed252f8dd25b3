use ariadne::{Config as ReportConfig, Label, Report, ReportKind, Source};
use chumsky::{input::ValueInput, pratt::*, prelude::*};
use std::borrow::Cow;
use std::fmt;
use std::ops::Range;
use thiserror::Error;

mod lexer;
pub use lexer::{Token, lexer};
use lexer::unescape;

mod layout;
pub use layout::significant_newlines;

mod expression;
pub use expression::*;

use crate::value::Value;

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

fn statements<'code, I, P>(
    expression: P,
) -> impl Parser<'code, I, Vec<Expr>, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
    P: Parser<'code, I, Expr, extra::Err<ParseError<'code, Token<'code>>>> + Clone,
{
    let separator = select! { Token::Newline => (), Token::Semicolon => () };
    separator
        .clone()
        .repeated()
        .ignore_then(
            expression
                .separated_by(separator.clone().repeated().at_least(1))
                .allow_trailing()
                .collect::<Vec<Expr>>(),
        )
        .then_ignore(separator.repeated())
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Expr>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let expression = recursive(|expression| {
        let comma = just(Token::Comma);
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);

        let identifier = select! { Token::Identifier(identifier) => identifier };

        let literal = select! {
            Token::Number(number) => Value::Number(number),
            Token::Text(text) => Value::Text(unescape(text).into()),
            Token::True => Value::Logical(true),
            Token::False => Value::Logical(false),
            Token::Null => Value::Null,
        }
        .map(Expr::Literal);

        let parameter = choice((
            just(Token::Dots).to(Parameter {
                name: DOTS.into(),
                default: None,
            }),
            identifier
                .then(just(Token::Equals).ignore_then(expression.clone()).or_not())
                .map(|(name, default): (&str, _)| Parameter {
                    name: name.into(),
                    default,
                }),
        ));

        let function = just(Token::Function)
            .ignore_then(
                parameter
                    .separated_by(comma.clone())
                    .allow_trailing()
                    .collect::<Vec<_>>()
                    .delimited_by(bracket_round_open.clone(), bracket_round_close.clone()),
            )
            .then(expression.clone())
            .map(|(parameters, body)| Expr::Function {
                parameters: parameters.into(),
                body: std::sync::Arc::new(body),
            });

        let block = statements(expression.clone())
            .delimited_by(just(Token::BracketCurlyOpen), just(Token::BracketCurlyClose))
            .map(Expr::Block);

        let nested = expression
            .clone()
            .delimited_by(bracket_round_open.clone(), bracket_round_close.clone());

        let dots = just(Token::Dots).to(Expr::symbol(DOTS));

        let atom = choice((
            literal,
            function,
            block,
            nested,
            dots,
            identifier.map(Expr::symbol),
        ));

        // `name = value`, `target := value` or a plain value
        let argument_name = select! {
            Token::Identifier(name) => Cow::Borrowed(name),
            Token::Text(name) => unescape(name),
        };
        let named_argument = argument_name
            .then_ignore(just(Token::Equals))
            .then(expression.clone())
            .map(|(name, value)| Argument::named(name, value));
        let other_argument = expression
            .clone()
            .then(just(Token::ColonEqual).ignore_then(expression.clone()).or_not())
            .map(|(value, assigned)| match assigned {
                Some(assigned) => Argument {
                    name: ArgumentName::Target(Box::new(value)),
                    value: assigned,
                },
                None => Argument::positional(value),
            });
        let arguments = choice((named_argument, other_argument))
            .separated_by(comma)
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(bracket_round_open, bracket_round_close);

        let call = atom.foldl(arguments.repeated(), |function, arguments| Expr::Call {
            function: Box::new(function),
            arguments,
        });

        let comparator = select! {
            Token::Equal => "==",
            Token::NotEqual => "!=",
            Token::Less => "<",
            Token::LessOrEqual => "<=",
            Token::Greater => ">",
            Token::GreaterOrEqual => ">=",
        };
        let additive = select! { Token::Plus => "+", Token::Minus => "-" };
        let multiplicative = select! { Token::Asterisk => "*", Token::Slash => "/" };

        call.pratt((
            // Precedence 1 (lowest): assignment
            infix(right(1), just(Token::Assign), |l, _, r, _| {
                Expr::binary("<-", l, r)
            }),
            infix(right(2), just(Token::Tilde), |l, _, r, _| {
                Expr::binary("~", l, r)
            }),
            prefix(2, just(Token::Tilde), |_, r, _| Expr::unary("~", r)),
            infix(left(3), just(Token::Or), |l, _, r, _| Expr::binary("|", l, r)),
            infix(left(4), just(Token::And), |l, _, r, _| Expr::binary("&", l, r)),
            prefix(5, just(Token::Bang), |_, r, _| Expr::unary("!", r)),
            infix(left(6), comparator, |l, operator, r, _| {
                Expr::binary(operator, l, r)
            }),
            infix(left(7), additive, |l, operator, r, _| {
                Expr::binary(operator, l, r)
            }),
            infix(left(8), multiplicative, |l, operator, r, _| {
                Expr::binary(operator, l, r)
            }),
            infix(left(9), just(Token::Pipe), |l, _, r, _| Expr::pipe(l, r)),
            prefix(10, just(Token::Minus), |_, r, _| match r {
                Expr::Literal(Value::Number(number)) => Expr::Literal(Value::Number(-number)),
                r => Expr::unary("-", r),
            }),
            prefix(10, just(Token::Unquote), |_, r, _| Expr::Unquote(Box::new(r))),
            prefix(10, just(Token::Splice), |_, r, _| Expr::Splice(Box::new(r))),
            // Precedence 11 (highest): power
            infix(right(11), just(Token::Caret), |l, _, r, _| {
                Expr::binary("^", l, r)
            }),
        ))
        .boxed()
    });

    statements(expression)
}

/// A parse or lex error, detached from the source it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub span: Range<usize>,
    pub message: String,
    pub reason: String,
}

impl Diagnostic {
    fn from_rich<T: fmt::Display>(error: &ParseError<'_, T>) -> Self {
        Self {
            span: error.span().into_range(),
            message: error.to_string(),
            reason: error.reason().to_string(),
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{report}")]
pub struct ParseFailure {
    pub diagnostics: Vec<Diagnostic>,
    /// Human-readable ariadne rendering of all diagnostics.
    pub report: String,
}

impl ParseFailure {
    fn new(diagnostics: Vec<Diagnostic>, filename: &str, source_code: &str) -> Self {
        let report = report_errors(&diagnostics, filename, source_code);
        Self {
            diagnostics,
            report,
        }
    }
}

fn report_errors(diagnostics: &[Diagnostic], filename: &str, source_code: &str) -> String {
    let mut report_string = String::new();
    for diagnostic in diagnostics {
        let mut report_bytes = Vec::new();
        let written = Report::build(ReportKind::Error, (filename, diagnostic.span.clone()))
            .with_config(ReportConfig::default().with_color(false))
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((filename, diagnostic.span.clone())).with_message(&diagnostic.reason),
            )
            .finish()
            .write((filename, Source::from(source_code)), &mut report_bytes);
        match written {
            Ok(()) => report_string.push_str(&String::from_utf8_lossy(&report_bytes)),
            Err(_) => {
                report_string.push_str(&diagnostic.message);
                report_string.push('\n');
            }
        }
    }
    report_string
}

pub fn parse(source_code: &str) -> Result<Vec<Expr>, ParseFailure> {
    parse_named("<input>", source_code)
}

/// Parses `source_code`, using `filename` in rendered reports.
pub fn parse_named(filename: &str, source_code: &str) -> Result<Vec<Expr>, ParseFailure> {
    let (tokens, errors) = lexer().parse(source_code).into_output_errors();
    if !errors.is_empty() {
        let diagnostics = errors.iter().map(Diagnostic::from_rich).collect();
        return Err(ParseFailure::new(diagnostics, filename, source_code));
    }
    let tokens = significant_newlines(tokens.unwrap_or_default());

    let end = source_code.len();
    let (statements, errors) = parser()
        .parse(tokens.map(Span::from(end..end), |Spanned { node, span }| (node, span)))
        .into_output_errors();
    if !errors.is_empty() {
        let diagnostics = errors.iter().map(Diagnostic::from_rich).collect();
        return Err(ParseFailure::new(diagnostics, filename, source_code));
    }
    log::trace!("parsed {} statement(s) from {filename}", statements.as_ref().map_or(0, Vec::len));
    Ok(statements.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(code: &str) -> Expr {
        let mut statements = parse(code).unwrap();
        assert_eq!(statements.len(), 1, "{statements:?}");
        statements.remove(0)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(parse_one("a + b * c ^ 2").deparse(), "a + b * c^2");
        assert_eq!(parse_one("(a + b) * c").deparse(), "(a + b) * c");
        assert_eq!(parse_one("!a == b & c | d").deparse(), "!a == b & c | d");
        assert_eq!(parse_one("x <- y <- 1").deparse(), "x <- y <- 1");
        assert_eq!(parse_one("-2").deparse(), "-2");
    }

    #[test]
    fn test_unquote_binds_tightly() {
        let expr = parse_one("!!a + b");
        let Expr::Call { arguments, .. } = &expr else {
            panic!("expected a call, found {expr:?}");
        };
        assert_eq!(arguments[0].value, Expr::Unquote(Box::new(Expr::symbol("a"))));
        assert_eq!(expr.to_string(), "!!a + b");
    }

    #[test]
    fn test_pipe_chain() {
        let expr = parse_one(
            "df %>%\n  group_by(!!!groups) %>%\n  summarise(!!name := mean(!!x), n = n())",
        );
        assert_eq!(
            expr.to_string(),
            "summarise(group_by(df, !!!groups), !!name := mean(!!x), n = n())"
        );
        let Expr::Call { arguments, .. } = &expr else {
            panic!("expected a call");
        };
        assert!(matches!(arguments[1].name, ArgumentName::Target(_)));
        assert_eq!(arguments[2].fixed_name(), Some("n"));
    }

    #[test]
    fn test_function_literal_and_block() {
        let statements = parse(
            "my_summarise <- function(df, group_var, ...) {\n  group_var <- enquo(group_var)\n  df\n}\nmy_summarise(df, g1)",
        )
        .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].to_string(),
            "my_summarise <- function(df, group_var, ...) { group_var <- enquo(group_var); df }"
        );
    }

    #[test]
    fn test_function_literal_brackets_only_when_called() {
        assert_eq!(parse_one("f <- function(x) x + 1").to_string(), "f <- function(x) x + 1");
        assert_eq!(parse_one("(function(x) x)(1)").to_string(), "(function(x) x)(1)");
    }

    #[test]
    fn test_escaped_strings_deparse_back() {
        let expr = parse_one(r#"paste("say \"hi\"", 'a\tb')"#);
        let Expr::Call { arguments, .. } = &expr else {
            panic!("expected a call");
        };
        assert_eq!(arguments[0].value, Expr::literal("say \"hi\""));
        assert_eq!(expr.to_string(), r#"paste("say \"hi\"", "a\tb")"#);
        assert_eq!(parse_one(&expr.to_string()), expr);
    }

    #[test]
    fn test_formula_and_strings() {
        assert_eq!(
            parse_one("case_when(a > 1 ~ 'big', TRUE ~ \"small\")").to_string(),
            "case_when(a > 1 ~ \"big\", TRUE ~ \"small\")"
        );
        assert_eq!(parse_one("~ a + b").to_string(), "~a + b");
    }

    #[test]
    fn test_errors_are_reported() {
        let failure = parse("f(a, ").unwrap_err();
        assert!(!failure.diagnostics.is_empty());
        assert!(failure.report.contains("<input>"), "{}", failure.report);
    }
}
