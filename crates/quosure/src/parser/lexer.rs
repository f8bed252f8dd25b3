use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    Comment(&'code str),
    Number(f64),
    Text(&'code str),
    Identifier(&'code str),
    Dots,
    Function,
    True,
    False,
    Null,
    Assign,
    Equals,
    ColonEqual,
    Tilde,
    Pipe,
    Splice,
    Unquote,
    Bang,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
    And,
    Or,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Caret,
    Comma,
    Semicolon,
    Newline,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::Comment(comment) => comment.into(),
            Self::Number(number) => number.to_string().into(),
            Self::Text(text) => format!("\"{text}\"").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Dots => "...".into(),
            Self::Function => "function".into(),
            Self::True => "TRUE".into(),
            Self::False => "FALSE".into(),
            Self::Null => "NULL".into(),
            Self::Assign => "<-".into(),
            Self::Equals => "=".into(),
            Self::ColonEqual => ":=".into(),
            Self::Tilde => "~".into(),
            Self::Pipe => "|>".into(),
            Self::Splice => "!!!".into(),
            Self::Unquote => "!!".into(),
            Self::Bang => "!".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::Equal => "==".into(),
            Self::And => "&".into(),
            Self::Or => "|".into(),
            Self::Plus => "+".into(),
            Self::Minus => "-".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Caret => "^".into(),
            Self::Comma => ",".into(),
            Self::Semicolon => ";".into(),
            Self::Newline => "\n".into(),
        }
    }

    /// Tokens after which a line break does not end the statement.
    pub fn continues_expression(&self) -> bool {
        matches!(
            self,
            Self::BracketRoundOpen
                | Self::BracketCurlyOpen
                | Self::Assign
                | Self::Equals
                | Self::ColonEqual
                | Self::Tilde
                | Self::Pipe
                | Self::Splice
                | Self::Unquote
                | Self::Bang
                | Self::NotEqual
                | Self::GreaterOrEqual
                | Self::Greater
                | Self::LessOrEqual
                | Self::Less
                | Self::Equal
                | Self::And
                | Self::Or
                | Self::Plus
                | Self::Minus
                | Self::Asterisk
                | Self::Slash
                | Self::Caret
                | Self::Comma
                | Self::Semicolon
                | Self::Newline
        )
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

/// Resolves backslash escapes in the raw body of a string literal.
pub fn unescape(text: &str) -> Cow<'_, str> {
    if !text.contains('\\') {
        return Cow::Borrowed(text);
    }
    let mut output = String::with_capacity(text.len());
    let mut characters = text.chars();
    while let Some(character) = characters.next() {
        if character != '\\' {
            output.push(character);
            continue;
        }
        match characters.next() {
            Some('n') => output.push('\n'),
            Some('r') => output.push('\r'),
            Some('t') => output.push('\t'),
            Some('0') => output.push('\0'),
            Some(escaped) => output.push(escaped),
            None => output.push('\\'),
        }
    }
    Cow::Owned(output)
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
    ));

    // Longest match first: `!!!` must not lex as `!!` followed by `!`.
    let bang = choice((
        just("!!!").to(Token::Splice),
        just("!!").to(Token::Unquote),
        just("!=").to(Token::NotEqual),
        just('!').to(Token::Bang),
    ));

    // `x<-1` is an assignment, as in R.
    let comparator_or_assignment = choice((
        just("<-").to(Token::Assign),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("==").to(Token::Equal),
        just(":=").to(Token::ColonEqual),
        just('=').to(Token::Equals),
    ));

    let operator = choice((
        just("%>%").to(Token::Pipe),
        just("|>").to(Token::Pipe),
        just('|').to(Token::Or),
        just('&').to(Token::And),
        just('~').to(Token::Tilde),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('^').to(Token::Caret),
        just(',').to(Token::Comma),
        just(';').to(Token::Semicolon),
    ));

    let comment = just('#')
        .then(none_of("\r\n").repeated())
        .to_slice()
        .map(Token::Comment);

    // `1`, `1.5`, `.5`, each with an optional exponent
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));
    let number = choice((
        text::int(10)
            .then(just('.').then(text::digits(10)).or_not())
            .ignored(),
        just('.').then(text::digits(10)).ignored(),
    ))
    .then(exponent.or_not())
    .to_slice()
    .from_str()
    .unwrapped()
    .map(Token::Number);

    // The token keeps the raw body; `unescape` resolves it.
    let escape = just('\\').then(any()).ignored();
    let double_quoted = just('"')
        .ignore_then(
            none_of("\\\"")
                .ignored()
                .or(escape.clone())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'));
    let single_quoted = just('\'')
        .ignore_then(none_of("\\'").ignored().or(escape).repeated().to_slice())
        .then_ignore(just('\''));
    let text = double_quoted.or(single_quoted).map(Token::Text);

    let backtick_identifier = just('`')
        .ignore_then(none_of('`').repeated().at_least(1).to_slice())
        .then_ignore(just('`'))
        .map(Token::Identifier);

    let identifier = any()
        .filter(|character: &char| character.is_ascii_alphabetic() || *character == '.')
        .then(
            any()
                .filter(|character: &char| {
                    character.is_ascii_alphanumeric() || *character == '_' || *character == '.'
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier: &'code str| match identifier {
            "function" => Token::Function,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "NULL" => Token::Null,
            "..." => Token::Dots,
            _ => Token::Identifier(identifier),
        });

    let token = choice((
        comment,
        text::newline().to(Token::Newline),
        bracket,
        number,
        text,
        backtick_identifier,
        identifier,
        bang,
        comparator_or_assignment,
        operator,
    ));

    token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .padded_by(text::inline_whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()))
        .repeated()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chumsky::prelude::Parser;

    fn tokens(code: &str) -> Vec<Token<'_>> {
        let result = lexer().parse(code);
        result
            .output()
            .unwrap()
            .iter()
            .map(|token| token.node)
            .collect()
    }

    #[test]
    fn test_quasiquotation_operators() {
        assert_eq!(
            tokens("!!!xs !!x !y != z"),
            vec![
                Token::Splice,
                Token::Identifier("xs"),
                Token::Unquote,
                Token::Identifier("x"),
                Token::Bang,
                Token::Identifier("y"),
                Token::NotEqual,
                Token::Identifier("z"),
            ]
        );
    }

    #[test]
    fn test_dynamic_name_and_pipes() {
        assert_eq!(
            tokens("df %>% mutate(!!name := a) |> f()"),
            vec![
                Token::Identifier("df"),
                Token::Pipe,
                Token::Identifier("mutate"),
                Token::BracketRoundOpen,
                Token::Unquote,
                Token::Identifier("name"),
                Token::ColonEqual,
                Token::Identifier("a"),
                Token::BracketRoundClose,
                Token::Pipe,
                Token::Identifier("f"),
                Token::BracketRoundOpen,
                Token::BracketRoundClose,
            ]
        );
    }

    #[test]
    fn test_identifiers_keywords_and_literals() {
        assert_eq!(
            tokens("na.rm function(...) TRUE NULL 'it' \"two\" 1.5 `odd name`"),
            vec![
                Token::Identifier("na.rm"),
                Token::Function,
                Token::BracketRoundOpen,
                Token::Dots,
                Token::BracketRoundClose,
                Token::True,
                Token::Null,
                Token::Text("it"),
                Token::Text("two"),
                Token::Number(1.5),
                Token::Identifier("odd name"),
            ]
        );
    }

    #[test]
    fn test_assignment_and_comments() {
        assert_eq!(
            tokens("x<-1 # note\ny"),
            vec![
                Token::Identifier("x"),
                Token::Assign,
                Token::Number(1.0),
                Token::Comment("# note"),
                Token::Newline,
                Token::Identifier("y"),
            ]
        );
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(
            tokens(".5 1e3 2.5E-1 .x"),
            vec![
                Token::Number(0.5),
                Token::Number(1000.0),
                Token::Number(0.25),
                Token::Identifier(".x"),
            ]
        );
    }

    #[test]
    fn test_escaped_quotes_stay_in_one_token() {
        assert_eq!(
            tokens(r#""a\"b" 'it\'s'"#),
            vec![Token::Text(r#"a\"b"#), Token::Text(r"it\'s")]
        );
        assert_eq!(unescape(r#"a\"b\n"#), "a\"b\n");
        assert_eq!(unescape("plain"), "plain");
    }
}
