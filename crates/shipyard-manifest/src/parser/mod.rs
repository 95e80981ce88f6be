//! Manifest script parser built on `nom`.
//!
//! Transforms raw manifest text into a [`Program`] of call statements
//! through a lexing phase and a recursive-descent parsing phase. The grammar
//! only admits calls with literal arguments; anything resembling general
//! purpose scripting (declarations, operators, expressions) is a syntax
//! error.

pub mod ast;
pub mod lexer;

use serde_json::{Map, Number, Value};

use crate::error::ManifestFault;

use self::ast::{Call, Program};
use self::lexer::{Lexeme, Token};

type ParseResult<T> = Result<T, ManifestFault>;

/// Cursor into a token stream for recursive-descent parsing.
struct TokenCursor<'a> {
    lexemes: &'a [Lexeme],
    pos: usize,
}

impl<'a> TokenCursor<'a> {
    const fn new(lexemes: &'a [Lexeme]) -> Self {
        Self { lexemes, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.lexemes.get(self.pos).map(|l| &l.token)
    }

    fn line(&self) -> usize {
        self.lexemes
            .get(self.pos)
            .or_else(|| self.lexemes.last())
            .map_or(1, |l| l.line)
    }

    fn advance(&mut self) -> Option<&Token> {
        let lexeme = self.lexemes.get(self.pos);
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme.map(|l| &l.token)
    }

    fn unexpected(&self) -> ManifestFault {
        match self.lexemes.get(self.pos) {
            Some(lexeme) => ManifestFault::evaluation(format!(
                "SyntaxError: Unexpected token {} at line {}",
                describe(&lexeme.token),
                lexeme.line
            )),
            None => ManifestFault::evaluation("SyntaxError: Unexpected end of input"),
        }
    }

    fn expect_token(&mut self, expected: &Token) -> ParseResult<()> {
        if self.peek() == Some(expected) {
            let _ = self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            let _ = self.advance();
            true
        } else {
            false
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::True => "`true`".into(),
        Token::False => "`false`".into(),
        Token::Null => "`null`".into(),
        Token::Identifier(name) => format!("`{name}`"),
        Token::StringLiteral(s) => format!("string \"{s}\""),
        Token::Number(n) => format!("number {n}"),
        Token::BraceOpen => "`{`".into(),
        Token::BraceClose => "`}`".into(),
        Token::BracketOpen => "`[`".into(),
        Token::BracketClose => "`]`".into(),
        Token::ParenOpen => "`(`".into(),
        Token::ParenClose => "`)`".into(),
        Token::Colon => "`:`".into(),
        Token::Comma => "`,`".into(),
        Token::Semicolon => "`;`".into(),
    }
}

/// Parses manifest source text into a program of call statements.
///
/// # Errors
///
/// Returns [`ManifestFault::Evaluation`] on any lexical or syntax error.
pub fn parse_manifest(input: &str) -> ParseResult<Program> {
    tracing::debug!("parsing manifest source");
    let lexemes = lexer::tokenize(input)?;
    let mut cursor = TokenCursor::new(&lexemes);
    parse_program(&mut cursor)
}

fn parse_program(cursor: &mut TokenCursor<'_>) -> ParseResult<Program> {
    let mut program = Program::default();

    while let Some(token) = cursor.peek() {
        match token {
            Token::Semicolon => {
                let _ = cursor.advance();
            }
            Token::Identifier(_) => program.calls.push(parse_call(cursor)?),
            _ => return Err(cursor.unexpected()),
        }
    }

    Ok(program)
}

fn parse_call(cursor: &mut TokenCursor<'_>) -> ParseResult<Call> {
    let line = cursor.line();
    let callee = match cursor.advance() {
        Some(Token::Identifier(name)) => name.clone(),
        _ => return Err(cursor.unexpected()),
    };
    cursor.expect_token(&Token::ParenOpen)?;

    let mut args = Vec::new();
    while cursor.peek() != Some(&Token::ParenClose) {
        args.push(parse_value(cursor)?);
        if !cursor.eat(&Token::Comma) {
            break;
        }
    }
    cursor.expect_token(&Token::ParenClose)?;

    match cursor.peek() {
        None | Some(Token::Semicolon | Token::Identifier(_)) => {}
        Some(_) => return Err(cursor.unexpected()),
    }

    Ok(Call { callee, args, line })
}

fn parse_value(cursor: &mut TokenCursor<'_>) -> ParseResult<Value> {
    let value = match cursor.peek() {
        Some(Token::BraceOpen) => return parse_object(cursor),
        Some(Token::BracketOpen) => return parse_array(cursor),
        Some(Token::StringLiteral(s)) => Value::String(s.clone()),
        Some(Token::Number(n)) => {
            Value::Number(parse_number(n).ok_or_else(|| cursor.unexpected())?)
        }
        Some(Token::True) => Value::Bool(true),
        Some(Token::False) => Value::Bool(false),
        Some(Token::Null) => Value::Null,
        Some(Token::Identifier(name)) => {
            return Err(ManifestFault::evaluation(format!(
                "ReferenceError: {name} is not defined"
            )));
        }
        _ => return Err(cursor.unexpected()),
    };
    let _ = cursor.advance();
    Ok(value)
}

fn parse_number(text: &str) -> Option<Number> {
    text.parse::<i64>()
        .ok()
        .map(Number::from)
        .or_else(|| text.parse::<u64>().ok().map(Number::from))
        .or_else(|| text.parse::<f64>().ok().and_then(Number::from_f64))
}

fn parse_object(cursor: &mut TokenCursor<'_>) -> ParseResult<Value> {
    cursor.expect_token(&Token::BraceOpen)?;
    let mut map = Map::new();

    while cursor.peek() != Some(&Token::BraceClose) {
        let key = match cursor.peek() {
            Some(Token::Identifier(k) | Token::StringLiteral(k)) => k.clone(),
            Some(Token::Number(n)) => n.clone(),
            _ => return Err(cursor.unexpected()),
        };
        let _ = cursor.advance();
        cursor.expect_token(&Token::Colon)?;
        let value = parse_value(cursor)?;
        let _ = map.insert(key, value);
        if !cursor.eat(&Token::Comma) {
            break;
        }
    }

    cursor.expect_token(&Token::BraceClose)?;
    Ok(Value::Object(map))
}

fn parse_array(cursor: &mut TokenCursor<'_>) -> ParseResult<Value> {
    cursor.expect_token(&Token::BracketOpen)?;
    let mut items = Vec::new();

    while cursor.peek() != Some(&Token::BracketClose) {
        items.push(parse_value(cursor)?);
        if !cursor.eat(&Token::Comma) {
            break;
        }
    }

    cursor.expect_token(&Token::BracketClose)?;
    Ok(Value::Array(items))
}
