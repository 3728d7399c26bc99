//! Oplast - a minimal operator-last S-expression interpreter
//!
//! This crate tokenizes parenthesized source text, builds a tree of atoms and lists,
//! and evaluates it against a chained lexical environment with closures and a handful
//! of special forms.
//!
//! ## Operator-last notation
//!
//! Within a list the operator occupies the *last* position and every preceding element
//! is an operand:
//!
//! ```text
//! (3 4 +)                        ; 7
//! (10 2 3 -)                     ; 5, i.e. 10 - (2 + 3)
//! ((1 2 3) quote)                ; '(1 2 3), unevaluated
//! (sq ((x) (x x *) lambda) define)
//! (5 sq)                         ; 25
//! ((false 1) (true 2) cond)      ; 2
//! ```
//!
//! Symbols that are not bound in any enclosing frame evaluate to their own text rather
//! than failing.
//!
//! ## Modules
//!
//! - `sexpr`: tokenizer and recursive-descent parser
//! - `ast`: the [`ast::Value`] type shared by syntax and runtime data
//! - `evaluator`: scope chain, special forms and application
//! - `builtinops`: the primitive library installed in every root environment
//! - `program`: a session driver that evaluates whole programs and collects print output
//! - `json`: JSON interop for values (feature `json`)

use std::fmt;

use crate::ast::Value;
use crate::evaluator::Environment;

/// Maximum nesting of parentheses accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum nesting of closure calls, to prevent stack overflow in recursive evaluation.
/// There is no tail-call elimination, so deeply recursive closures hit this limit.
pub const MAX_EVAL_DEPTH: usize = 512;

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Unmatched parentheses, empty programs and truncated input
    SyntaxError(String),
    /// The operator position of an application did not resolve to a callable value
    NotCallable {
        value: Value,
        type_name: &'static str,
        env: Environment,
    },
    EvalError(String),
    TypeError(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }

    pub(crate) fn not_callable(value: Value, env: &Environment) -> Self {
        Error::NotCallable {
            type_name: value.type_name(),
            value,
            env: env.clone(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SyntaxError(msg) => write!(f, "SyntaxError: {msg}"),
            Error::NotCallable {
                value,
                type_name,
                env,
            } => write!(f, "Not callable: {type_name}:{value}. {env:?}"),
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod program;
pub mod sexpr;

#[cfg(feature = "json")]
pub mod json;

pub use program::Program;
