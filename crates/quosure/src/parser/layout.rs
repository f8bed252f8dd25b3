use super::{Spanned, Token};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bracket {
    Round,
    Parameters,
    Curly,
}

/// Removes comments and every line break that does not end a statement.
///
/// A line break separates statements only at the top level or directly
/// inside `{ }`, and only when the line so far is a complete expression:
/// breaks after an operator, a comma, an opening bracket or a function's
/// parameter list continue the expression, as do breaks inside `( )`.
pub fn significant_newlines<'code>(
    tokens: impl IntoIterator<Item = Spanned<Token<'code>>>,
) -> Vec<Spanned<Token<'code>>> {
    let mut output: Vec<Spanned<Token<'code>>> = Vec::new();
    let mut brackets = Vec::new();
    let mut after_parameters = false;

    for token in tokens {
        match token.node {
            Token::Comment(_) => continue,
            Token::Newline => {
                let at_statement_level =
                    matches!(brackets.last(), None | Some(Bracket::Curly));
                let line_complete = output
                    .last()
                    .is_some_and(|previous| !previous.node.continues_expression());
                if at_statement_level && line_complete && !after_parameters {
                    output.push(token);
                }
                continue;
            }
            Token::BracketRoundOpen => {
                let opens_parameters = output
                    .last()
                    .is_some_and(|previous| previous.node == Token::Function);
                brackets.push(if opens_parameters {
                    Bracket::Parameters
                } else {
                    Bracket::Round
                });
            }
            Token::BracketCurlyOpen => brackets.push(Bracket::Curly),
            Token::BracketRoundClose | Token::BracketCurlyClose => {
                if output
                    .last()
                    .is_some_and(|previous| previous.node == Token::Newline)
                {
                    output.pop();
                }
                if brackets.pop() == Some(Bracket::Parameters) {
                    output.push(token);
                    after_parameters = true;
                    continue;
                }
            }
            _ => {}
        }
        after_parameters = false;
        output.push(token);
    }

    if output
        .last()
        .is_some_and(|previous| previous.node == Token::Newline)
    {
        output.pop();
    }
    output
}

#[cfg(test)]
mod tests {
    use super::super::lexer;
    use super::*;
    use chumsky::prelude::Parser;

    fn layout(code: &str) -> Vec<Token<'_>> {
        let tokens = lexer().parse(code).into_output().unwrap();
        significant_newlines(tokens)
            .into_iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn test_statement_breaks_are_kept() {
        assert_eq!(
            layout("a <- 1\n\n# comment\nb"),
            vec![
                Token::Identifier("a"),
                Token::Assign,
                Token::Number(1.0),
                Token::Newline,
                Token::Identifier("b"),
            ]
        );
    }

    #[test]
    fn test_continuations_are_dropped() {
        assert_eq!(
            layout("df %>%\n  group_by(\n    a,\n    b\n  )\n"),
            vec![
                Token::Identifier("df"),
                Token::Pipe,
                Token::Identifier("group_by"),
                Token::BracketRoundOpen,
                Token::Identifier("a"),
                Token::Comma,
                Token::Identifier("b"),
                Token::BracketRoundClose,
            ]
        );
    }

    #[test]
    fn test_function_body_on_next_line() {
        assert_eq!(
            layout("f <- function(x)\n{\n  x\n  y\n}"),
            vec![
                Token::Identifier("f"),
                Token::Assign,
                Token::Function,
                Token::BracketRoundOpen,
                Token::Identifier("x"),
                Token::BracketRoundClose,
                Token::BracketCurlyOpen,
                Token::Identifier("x"),
                Token::Newline,
                Token::Identifier("y"),
                Token::BracketCurlyClose,
            ]
        );
    }
}
