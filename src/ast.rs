//! This module defines the [`Value`] type, which serves both as the syntax tree produced
//! by the parser and as the runtime value produced by evaluation. A parsed atom is a
//! leaf holding an integer, a real or a symbol; a parsed list is a [`Value::List`],
//! which is also the only compound runtime value. Evaluation additionally produces
//! booleans, closures, primitives and the "no value" marker [`Value::Unspecified`].
//!
//! Display rendering follows the language's printing convention: atoms render as
//! their plain text and lists as `'(` followed by the space-joined elements and `)`.

use std::rc::Rc;

use crate::builtinops::PrimitiveFn;
use crate::evaluator::Environment;

/// Type alias for integer atoms
pub(crate) type IntegerType = i64;

/// Type alias for real atoms
pub(crate) type RealType = f64;

/// Core AST and runtime value type
///
/// To build an AST by hand, use the helper functions:
/// - `val(42)` for values, `sym("name")` for symbols, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("x"), val(1), sym("+")])` for mixed lists
#[derive(Clone)]
pub enum Value {
    /// Integer atoms
    Integer(IntegerType),
    /// Real atoms
    Real(RealType),
    /// Symbol atoms; any token that is not a number. Unbound symbols evaluate to themselves.
    Symbol(String),
    /// Results of comparisons and predicates
    Bool(bool),
    /// Lists: syntax nodes for parenthesized forms and the compound runtime value
    List(Vec<Value>),
    /// Built-in callables (compared by id, not by function pointer)
    Primitive { id: String, func: Rc<PrimitiveFn> },
    /// User-defined functions: parameter-list expression, body expression and the
    /// defining environment, all captured unevaluated
    Closure {
        params: Box<Value>,
        body: Box<Value>,
        env: Environment,
    },
    /// Result of forms that produce no value (define, print, a cond with no match)
    Unspecified,
}

impl Value {
    /// Classify a token: integer if it parses as one, else real, else the token text itself.
    pub fn atom(token: &str) -> Self {
        if let Ok(n) = token.parse::<IntegerType>() {
            Value::Integer(n)
        } else if let Ok(r) = token.parse::<RealType>() {
            Value::Real(r)
        } else {
            Value::Symbol(token.to_owned())
        }
    }

    /// Everything except a list is an atom
    pub fn is_atom(&self) -> bool {
        !matches!(self, Value::List(_))
    }

    /// Runtime type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Symbol(_) => "symbol",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Primitive { .. } => "primitive",
            Value::Closure { .. } => "closure",
            Value::Unspecified => "unspecified",
        }
    }

    /// Truthiness as used by `cond`: false, zero, empty text, the empty list and
    /// no-value are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::Real(r) => *r != 0.0,
            Value::Symbol(s) => !s.is_empty(),
            Value::List(list) => !list.is_empty(),
            Value::Unspecified => false,
            Value::Primitive { .. } | Value::Closure { .. } => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Primitive { .. } | Value::Closure { .. })
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Real(r) => write!(f, "Real({r:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Primitive { id, .. } => write!(f, "Primitive({id})"),
            Value::Closure { params, body, .. } => {
                write!(f, "Closure(params={params:?}, body={body:?})")
            }
            Value::Unspecified => write!(f, "Unspecified"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Symbol(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Symbol(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<RealType> for Value {
    fn from(r: RealType) -> Self {
        Value::Real(r)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as IntegerType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating symbols in mixed lists
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::List(vec![])
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            // Reals keep a fractional part so they re-read as reals
            Value::Real(r) if r.is_finite() && r.fract() == 0.0 => write!(f, "{r:.1}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(elements) => {
                write!(f, "'(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Primitive { id, .. } => write!(f, "#<primitive:{id}>"),
            Value::Closure { .. } => write!(f, "#<closure>"),
            Value::Unspecified => write!(f, "#<unspecified>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::Integer(a), Value::Real(b)) | (Value::Real(b), Value::Integer(a)) => {
                *a as RealType == *b
            }
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Primitive { id: id1, .. }, Value::Primitive { id: id2, .. }) => id1 == id2,
            (
                Value::Closure {
                    params: p1,
                    body: b1,
                    env: e1,
                },
                Value::Closure {
                    params: p2,
                    body: b2,
                    env: e2,
                },
            ) => p1 == p2 && b1 == b2 && e1 == e2,
            (Value::Unspecified, Value::Unspecified) => true,
            _ => false,
        }
    }
}
