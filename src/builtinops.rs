//! Built-in primitive registry.
//!
//! Every root environment is seeded from this registry by
//! [`crate::evaluator::create_global_env`]. Primitives receive their arguments already
//! evaluated, in operand order:
//!
//! ```text
//! (1 2 3 +)              ; 6
//! (10 2 3 -)             ; 5, first minus the sum of the rest
//! (24 2 3 /)             ; 4, first divided by the product of the rest
//! (1 ((2 3) quote) cons) ; '(1 2 3)
//! ```
//!
//! Special forms (`quote`, `atom?`, `define`, `lambda`, `cond`) control the evaluation of
//! their operands and live in the evaluator, not here.
//!
//! ## Numbers
//!
//! Integer arithmetic stays integral and reports overflow. Any real operand makes the
//! result real. Division of integers is exact when possible and real otherwise.
//!
//! ## Adding New Operations
//!
//! 1. Implement the function with the signature `fn(Vec<Value>) -> Result<Value, Error>`
//! 2. Add it to `BUILTIN_OPS` with its identifier and arity

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::Error;
use crate::ast::{RealType, Value};

/// Canonical erased primitive signature used by the evaluator.
///
/// Primitives receive ownership of their argument vector.
pub type PrimitiveFn = dyn Fn(Vec<Value>) -> Result<Value, Error>;

/// Output sink shared between a session and its `print` primitive
pub type OutputBuffer = Rc<RefCell<Vec<String>>>;

/// Accepted argument counts of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn validate(&self, arg_count: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(n) if arg_count != n => Err(Error::arity_error(n, arg_count)),
            Arity::AtLeast(n) if arg_count < n => Err(Error::arity_error(n, arg_count)),
            _ => Ok(()),
        }
    }
}

/// Definition of a built-in primitive
#[derive(Debug, Clone, Copy)]
pub struct BuiltinOp {
    /// The symbol the primitive is bound to in the root environment
    pub id: &'static str,
    pub func: fn(Vec<Value>) -> Result<Value, Error>,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    /// Wrap this operation as a callable runtime value with arity checking
    pub fn to_value(&self) -> Value {
        let func = self.func;
        make_primitive(self.id, self.arity, move |args| func(args))
    }
}

/// Build a primitive value from any Rust closure. Arity is validated before the
/// closure runs.
pub fn make_primitive<F>(id: &str, arity: Arity, func: F) -> Value
where
    F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
{
    Value::Primitive {
        id: id.to_owned(),
        func: Rc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            func(args)
        }),
    }
}

/// Build the `print` primitive bound to a session's output buffer
pub fn print_primitive(sink: OutputBuffer) -> Value {
    make_primitive("print", Arity::Exact(1), move |args| {
        for arg in &args {
            sink.borrow_mut().push(format!("{arg}"));
        }
        Ok(Value::Unspecified)
    })
}

//
// Builtin Function Implementations
//

fn as_real(value: &Value, op_name: &str) -> Result<RealType, Error> {
    match value {
        Value::Integer(n) => Ok(*n as RealType),
        Value::Real(r) => Ok(*r),
        other => Err(Error::TypeError(format!(
            "'{op_name}' requires numeric arguments, got {}: {other}",
            other.type_name()
        ))),
    }
}

// Macro to generate binary arithmetic on the integer/real pair
macro_rules! arithmetic_op {
    ($name:ident, $checked:ident, $op:tt, $op_str:expr, $what:expr) => {
        fn $name(a: &Value, b: &Value) -> Result<Value, Error> {
            match (a, b) {
                (Value::Integer(x), Value::Integer(y)) => x
                    .$checked(*y)
                    .map(Value::Integer)
                    .ok_or_else(|| Error::EvalError(concat!("Integer overflow in ", $what).into())),
                _ => Ok(Value::Real(as_real(a, $op_str)? $op as_real(b, $op_str)?)),
            }
        }
    };
}

arithmetic_op!(add2, checked_add, +, "+", "addition");
arithmetic_op!(sub2, checked_sub, -, "-", "subtraction");
arithmetic_op!(mul2, checked_mul, *, "*", "multiplication");

fn div2(a: &Value, b: &Value) -> Result<Value, Error> {
    match (a, b) {
        (Value::Integer(_), Value::Integer(0)) => Err(Error::EvalError("Division by zero".into())),
        (Value::Integer(x), Value::Integer(y)) => match x.checked_rem(*y) {
            Some(0) => x
                .checked_div(*y)
                .map(Value::Integer)
                .ok_or_else(|| Error::EvalError("Integer overflow in division".into())),
            Some(_) => Ok(Value::Real(*x as RealType / *y as RealType)),
            None => Err(Error::EvalError("Integer overflow in division".into())),
        },
        _ => {
            let divisor = as_real(b, "/")?;
            if divisor == 0.0 {
                return Err(Error::EvalError("Division by zero".into()));
            }
            Ok(Value::Real(as_real(a, "/")? / divisor))
        }
    }
}

fn sum(args: &[Value]) -> Result<Value, Error> {
    args.iter()
        .try_fold(Value::Integer(0), |acc, arg| add2(&acc, arg))
}

fn product(args: &[Value]) -> Result<Value, Error> {
    args.iter()
        .try_fold(Value::Integer(1), |acc, arg| mul2(&acc, arg))
}

fn builtin_add(args: Vec<Value>) -> Result<Value, Error> {
    sum(&args)
}

fn builtin_sub(args: Vec<Value>) -> Result<Value, Error> {
    match args.split_first() {
        Some((first, rest)) => sub2(first, &sum(rest)?),
        None => Err(Error::arity_error(1, 0)),
    }
}

fn builtin_mul(args: Vec<Value>) -> Result<Value, Error> {
    product(&args)
}

fn builtin_div(args: Vec<Value>) -> Result<Value, Error> {
    match args.split_first() {
        Some((first, rest)) => div2(first, &product(rest)?),
        None => Err(Error::arity_error(1, 0)),
    }
}

/// Order two values: numbers numerically, symbols lexicographically.
/// `None` when either side is NaN.
fn compare(a: &Value, b: &Value, op_name: &str) -> Result<Option<Ordering>, Error> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(Some(x.cmp(y))),
        (Value::Symbol(x), Value::Symbol(y)) => Ok(Some(x.cmp(y))),
        _ => Ok(as_real(a, op_name)?.partial_cmp(&as_real(b, op_name)?)),
    }
}

// Macro to generate ordering comparisons
macro_rules! ordering_comparison {
    ($name:ident, $ordering:expr, $op_str:expr) => {
        fn $name(args: Vec<Value>) -> Result<Value, Error> {
            match args.as_slice() {
                [a, b] => Ok(Value::Bool(compare(a, b, $op_str)? == Some($ordering))),
                _ => Err(Error::arity_error(2, args.len())),
            }
        }
    };
}

ordering_comparison!(builtin_lt, Ordering::Less, "<");
ordering_comparison!(builtin_gt, Ordering::Greater, ">");

fn builtin_eq(args: Vec<Value>) -> Result<Value, Error> {
    match args.as_slice() {
        [a, b] => Ok(Value::Bool(a == b)),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

fn builtin_car(args: Vec<Value>) -> Result<Value, Error> {
    match args.into_iter().next() {
        Some(Value::List(list)) => list
            .into_iter()
            .next()
            .ok_or_else(|| Error::EvalError("car of empty list".into())),
        Some(Value::Symbol(text)) => text
            .chars()
            .next()
            .map(|c| Value::Symbol(c.to_string()))
            .ok_or_else(|| Error::EvalError("car of empty symbol".into())),
        Some(other) => Err(Error::TypeError(format!(
            "car requires a list, got {}: {other}",
            other.type_name()
        ))),
        None => Err(Error::arity_error(1, 0)),
    }
}

fn builtin_cdr(args: Vec<Value>) -> Result<Value, Error> {
    match args.into_iter().next() {
        Some(Value::List(list)) => Ok(Value::List(list.into_iter().skip(1).collect())),
        Some(Value::Symbol(text)) => Ok(Value::List(
            text.chars()
                .skip(1)
                .map(|c| Value::Symbol(c.to_string()))
                .collect(),
        )),
        Some(other) => Err(Error::TypeError(format!(
            "cdr requires a list, got {}: {other}",
            other.type_name()
        ))),
        None => Err(Error::arity_error(1, 0)),
    }
}

/// Lists are always flat: consing onto a non-list yields a two-element list.
fn builtin_cons(args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(first), Some(Value::List(tail))) => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(first);
            new_list.extend(tail);
            Ok(Value::List(new_list))
        }
        (Some(first), Some(second)) => Ok(Value::List(vec![first, second])),
        _ => Err(Error::arity_error(2, 0)),
    }
}

/// Registry of all built-in primitives except `print`, which belongs to a session.
static BUILTIN_OPS: &[BuiltinOp] = &[
    // Arithmetic operations
    BuiltinOp {
        id: "+",
        func: builtin_add,
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "-",
        func: builtin_sub,
        arity: Arity::AtLeast(1),
    },
    BuiltinOp {
        id: "*",
        func: builtin_mul,
        arity: Arity::Any,
    },
    BuiltinOp {
        id: "/",
        func: builtin_div,
        arity: Arity::AtLeast(1),
    },
    // Comparison operations
    BuiltinOp {
        id: "<",
        func: builtin_lt,
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: ">",
        func: builtin_gt,
        arity: Arity::Exact(2),
    },
    BuiltinOp {
        id: "eq?",
        func: builtin_eq,
        arity: Arity::Exact(2),
    },
    // List operations
    BuiltinOp {
        id: "car",
        func: builtin_car,
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "cdr",
        func: builtin_cdr,
        arity: Arity::Exact(1),
    },
    BuiltinOp {
        id: "cons",
        func: builtin_cons,
        arity: Arity::Exact(2),
    },
];

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS
}

/// Find a builtin operation by the symbol it is bound to
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_OPS.iter().find(|op| op.id == id)
}
