use std::collections::VecDeque;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    combinator::value,
    multi::many0,
    sequence::{preceded, terminated},
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::Value;

/// Front-poppable queue of tokens consumed by [`parse`]
pub type TokenQueue = VecDeque<String>;

const OPEN: &str = "(";
const CLOSE: &str = ")";

/// Parse a parenthesis. The list display prefix `'(` reads as a plain open
/// parenthesis so rendered lists can be read back.
fn parse_paren(input: &str) -> IResult<&str, &str> {
    alt((value(OPEN, tag("'(")), tag(OPEN), tag(CLOSE))).parse(input)
}

/// Parse a whitespace-delimited word; parentheses always end a word
fn parse_word(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && c != '(' && c != ')').parse(input)
}

/// Skip any Unicode whitespace, including form feeds and non-breaking spaces
fn parse_separator(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace).parse(input)
}

fn parse_tokens(input: &str) -> IResult<&str, Vec<&str>> {
    terminated(
        many0(preceded(parse_separator, alt((parse_paren, parse_word)))),
        parse_separator,
    )
    .parse(input)
}

/// Split source text into a queue of tokens. Parentheses are always standalone
/// tokens; everything else is delimited by whitespace. No classification happens here.
pub fn tokenize(input: &str) -> Result<TokenQueue, Error> {
    match parse_tokens(input) {
        Ok(("", tokens)) => Ok(tokens.into_iter().map(str::to_owned).collect()),
        Ok((remaining, _)) => Err(Error::SyntaxError(format!(
            "Unrecognized input: '{remaining}'"
        ))),
        Err(err) => Err(Error::SyntaxError(format!("Tokenization failed: {err}"))),
    }
}

/// Parse one expression from the front of the queue, consuming its tokens.
/// Tokens belonging to later top-level forms are left in place.
pub fn parse(tokens: &mut TokenQueue) -> Result<Value, Error> {
    parse_with_depth(tokens, 0)
}

fn parse_with_depth(tokens: &mut TokenQueue, depth: usize) -> Result<Value, Error> {
    let Some(token) = tokens.pop_front() else {
        return Err(Error::SyntaxError("Unexpected end of input".into()));
    };

    match token.as_str() {
        OPEN => {
            if depth >= MAX_PARSE_DEPTH {
                return Err(Error::SyntaxError(format!(
                    "Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"
                )));
            }
            let mut elements = Vec::new();
            loop {
                match tokens.front().map(String::as_str) {
                    None => return Err(Error::SyntaxError("Missing )".into())),
                    Some(CLOSE) => {
                        tokens.pop_front();
                        return Ok(Value::List(elements));
                    }
                    Some(_) => elements.push(parse_with_depth(tokens, depth + 1)?),
                }
            }
        }
        CLOSE => Err(Error::SyntaxError("Unexpected )".into())),
        _ => Ok(Value::atom(&token)),
    }
}

/// Parse a whole program into its independent top-level forms.
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    let mut tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(Error::SyntaxError("Empty program".into()));
    }

    let mut forms = Vec::new();
    while !tokens.is_empty() {
        forms.push(parse(&mut tokens)?);
    }
    Ok(forms)
}

/// Parse exactly one expression; trailing tokens are an error.
pub fn parse_expr(input: &str) -> Result<Value, Error> {
    let mut tokens = tokenize(input)?;
    let expr = parse(&mut tokens)?;
    if tokens.is_empty() {
        Ok(expr)
    } else {
        let remaining: Vec<String> = tokens.into_iter().collect();
        Err(Error::SyntaxError(format!(
            "Unexpected remaining input: '{}'",
            remaining.join(" ")
        )))
    }
}
