//! Tokenization of manifest source text using `nom`.
//!
//! Produces a stream of [`Lexeme`]s for the parser to consume. Whitespace,
//! `//` line comments and `/* */` block comments are discarded between
//! tokens.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, digit1, multispace1, not_line_ending, one_of},
    combinator::{opt, recognize, value},
    multi::many0,
    sequence::{delimited, preceded},
};

use crate::error::ManifestFault;

/// A token of the manifest language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Boolean literal `true`.
    True,
    /// Boolean literal `false`.
    False,
    /// The `null` literal.
    Null,
    /// An identifier (function name, object key).
    Identifier(String),
    /// A single- or double-quoted string literal, escapes resolved.
    StringLiteral(String),
    /// A numeric literal, kept as source text.
    Number(String),
    /// `{` opening brace.
    BraceOpen,
    /// `}` closing brace.
    BraceClose,
    /// `[` opening bracket.
    BracketOpen,
    /// `]` closing bracket.
    BracketClose,
    /// `(` opening parenthesis.
    ParenOpen,
    /// `)` closing parenthesis.
    ParenClose,
    /// `:` key separator.
    Colon,
    /// `,` separator.
    Comma,
    /// `;` statement terminator.
    Semicolon,
}

/// A token with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexeme {
    /// The token itself.
    pub token: Token,
    /// 1-based source line.
    pub line: usize,
}

/// Skippable items: whitespace and comments.
fn skip_trivia(input: &str) -> IResult<&str, ()> {
    let line_comment = value((), preceded(tag("//"), not_line_ending));
    let block_comment = value((), delimited(tag("/*"), take_until("*/"), tag("*/")));
    let ws = value((), multispace1);
    let (input, _) = many0(alt((ws, line_comment, block_comment))).parse(input)?;
    Ok((input, ()))
}

/// Parses a string literal delimited by `'` or `"` with escape support.
fn string_literal(input: &str) -> IResult<&str, Token> {
    let (input, quote) = alt((char('"'), char('\''))).parse(input)?;
    let mut result = String::new();
    let mut chars = input.char_indices();
    loop {
        match chars.next() {
            Some((idx, c)) if c == quote => {
                let remaining = &input[idx + 1..];
                return Ok((remaining, Token::StringLiteral(result)));
            }
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, 'r')) => result.push('\r'),
                Some((_, '\\')) => result.push('\\'),
                Some((_, '"')) => result.push('"'),
                Some((_, '\'')) => result.push('\''),
                Some((_, c)) => {
                    result.push('\\');
                    result.push(c);
                }
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(
                        input,
                        nom::error::ErrorKind::Char,
                    )));
                }
            },
            Some((_, '\n')) | None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Char,
                )));
            }
            Some((_, c)) => result.push(c),
        }
    }
}

/// Parses a number literal: optional sign, digits, optional fraction.
fn number_literal(input: &str) -> IResult<&str, Token> {
    let (input, text) = recognize((
        opt(char('-')),
        digit1,
        opt((char('.'), digit1)),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)?;
    Ok((input, Token::Number(text.to_string())))
}

const fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

const fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

/// Parses an identifier or keyword literal.
fn identifier_or_keyword(input: &str) -> IResult<&str, Token> {
    let (input, word) =
        recognize((take_while1(is_ident_start), take_while(is_ident_continue))).parse(input)?;
    let token = match word {
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Identifier(word.to_string()),
    };
    Ok((input, token))
}

/// Parses a symbol token.
fn symbol(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::BraceOpen, char('{')),
        value(Token::BraceClose, char('}')),
        value(Token::BracketOpen, char('[')),
        value(Token::BracketClose, char(']')),
        value(Token::ParenOpen, char('(')),
        value(Token::ParenClose, char(')')),
        value(Token::Colon, char(':')),
        value(Token::Comma, char(',')),
        value(Token::Semicolon, char(';')),
    ))
    .parse(input)
}

/// Parses a single token (after trivia has been skipped).
fn single_token(input: &str) -> IResult<&str, Token> {
    alt((string_literal, symbol, number_literal, identifier_or_keyword)).parse(input)
}

fn line_of(source: &str, rest: &str) -> usize {
    let offset = source.len() - rest.len();
    source[..offset].matches('\n').count() + 1
}

/// Tokenizes manifest source text into lexemes.
///
/// # Errors
///
/// Returns [`ManifestFault::Evaluation`] naming the first character that
/// cannot start a token.
pub fn tokenize(input: &str) -> Result<Vec<Lexeme>, ManifestFault> {
    let mut lexemes = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = skip_trivia(remaining).map_err(|e| {
            ManifestFault::evaluation(format!("SyntaxError: invalid comment or whitespace ({e})"))
        })?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        let line = line_of(input, remaining);
        let (rest, token) = single_token(remaining).map_err(|_| {
            let unexpected = remaining.chars().next().unwrap_or_default();
            if unexpected == '"' || unexpected == '\'' {
                ManifestFault::evaluation(format!(
                    "SyntaxError: unterminated string literal at line {line}"
                ))
            } else {
                ManifestFault::evaluation(format!(
                    "SyntaxError: Unexpected token `{unexpected}` at line {line}"
                ))
            }
        })?;
        lexemes.push(Lexeme { token, line });
        remaining = rest;
    }

    Ok(lexemes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input)
            .expect("should tokenize")
            .into_iter()
            .map(|l| l.token)
            .collect()
    }

    #[test]
    fn tokenize_keywords() {
        assert_eq!(
            tokens("true false null"),
            vec![Token::True, Token::False, Token::Null]
        );
    }

    #[test]
    fn tokenize_symbols() {
        assert_eq!(
            tokens("{ } [ ] ( ) : , ;"),
            vec![
                Token::BraceOpen,
                Token::BraceClose,
                Token::BracketOpen,
                Token::BracketClose,
                Token::ParenOpen,
                Token::ParenClose,
                Token::Colon,
                Token::Comma,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn tokenize_both_quote_styles() {
        assert_eq!(
            tokens(r#""double" 'single'"#),
            vec![
                Token::StringLiteral("double".into()),
                Token::StringLiteral("single".into()),
            ]
        );
    }

    #[test]
    fn tokenize_string_with_escapes() {
        assert_eq!(
            tokens(r#""line\nnew\ttab\\slash\"quote\'tick""#),
            vec![Token::StringLiteral("line\nnew\ttab\\slash\"quote'tick".into())]
        );
    }

    #[test]
    fn tokenize_numbers() {
        assert_eq!(
            tokens("20 -3 1.5"),
            vec![
                Token::Number("20".into()),
                Token::Number("-3".into()),
                Token::Number("1.5".into()),
            ]
        );
    }

    #[test]
    fn tokenize_exponent_numbers() {
        assert_eq!(
            tokens("1e+21 2.5E-7 -4e3"),
            vec![
                Token::Number("1e+21".into()),
                Token::Number("2.5E-7".into()),
                Token::Number("-4e3".into()),
            ]
        );
    }

    #[test]
    fn tokenize_identifiers() {
        assert_eq!(
            tokens("system setDefault __not_exist $x"),
            vec![
                Token::Identifier("system".into()),
                Token::Identifier("setDefault".into()),
                Token::Identifier("__not_exist".into()),
                Token::Identifier("$x".into()),
            ]
        );
    }

    #[test]
    fn tokenize_skips_comments() {
        let input = "// header\nsystem /* inline */ (\n/* multi\nline */)";
        assert_eq!(
            tokens(input),
            vec![
                Token::Identifier("system".into()),
                Token::ParenOpen,
                Token::ParenClose,
            ]
        );
    }

    #[test]
    fn tokenize_tracks_lines() {
        let lexemes = tokenize("a\n\nb").expect("should tokenize");
        assert_eq!(lexemes[0].line, 1);
        assert_eq!(lexemes[1].line, 3);
    }

    #[test]
    fn tokenize_empty_input() {
        assert!(tokens("").is_empty());
        assert!(tokens("// only a comment").is_empty());
    }

    #[test]
    fn tokenize_error_on_invalid_char() {
        let err = tokenize("var = ;").expect_err("should fail");
        assert!(err.to_string().contains("Unexpected token `=`"), "got: {err}");
    }

    #[test]
    fn tokenize_error_on_unterminated_string() {
        let err = tokenize("system(\"web").expect_err("should fail");
        assert!(err.to_string().contains("unterminated"), "got: {err}");
    }
}
