use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::Value;
use crate::builtinops::{Arity, get_builtin_ops, make_primitive};

#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    outer: Option<Environment>,
}

/// Environment for variable bindings.
///
/// An `Environment` is a shared handle to one frame of the scope chain. Cloning it
/// clones the handle, so closures that capture an environment observe later
/// definitions made in it. Each frame only ever mutates its own bindings.
#[derive(Clone, Default)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    /// Create an empty child frame of `outer`
    pub fn with_outer(outer: &Environment) -> Self {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                bindings: HashMap::new(),
                outer: Some(outer.clone()),
            })),
        }
    }

    /// Create a child frame of `outer` binding each name to the value at the same
    /// position. Surplus names stay unbound and surplus values are dropped.
    pub fn with_bindings(names: Vec<String>, values: Vec<Value>, outer: &Environment) -> Self {
        let env = Environment::with_outer(outer);
        env.frame
            .borrow_mut()
            .bindings
            .extend(names.into_iter().zip(values));
        env
    }

    /// Bind `name` in this frame, overwriting any local binding
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.frame.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Find the frame responsible for `name`: the nearest frame that binds it, or the
    /// outermost frame when no frame does.
    pub fn find(&self, name: &str) -> Environment {
        let mut current = self.clone();
        loop {
            let outer = {
                let frame = current.frame.borrow();
                if frame.bindings.contains_key(name) {
                    None
                } else {
                    frame.outer.clone()
                }
            };
            match outer {
                Some(outer) => current = outer,
                None => return current,
            }
        }
    }

    /// Whether this frame itself binds `name`
    pub fn contains(&self, name: &str) -> bool {
        self.frame.borrow().bindings.contains_key(name)
    }

    /// Look `name` up through the scope chain
    pub fn get(&self, name: &str) -> Option<Value> {
        self.find(name).frame.borrow().bindings.get(name).cloned()
    }

    pub fn outer(&self) -> Option<Environment> {
        self.frame.borrow().outer.clone()
    }

    /// Register a host-supplied primitive in this frame.
    ///
    /// # Example
    /// ```
    /// use oplast::Error;
    /// use oplast::ast::Value;
    /// use oplast::builtinops::Arity;
    /// use oplast::evaluator::create_global_env;
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("double", Arity::Exact(1), |args| match args.as_slice() {
    ///     [Value::Integer(n)] => Ok(Value::Integer(n * 2)),
    ///     _ => Err(Error::TypeError("double requires an integer".into())),
    /// });
    /// // Now (21 double) evaluates to 42
    /// ```
    pub fn register_builtin_function<F>(&self, name: &str, arity: Arity, func: F)
    where
        F: Fn(Vec<Value>) -> Result<Value, Error> + 'static,
    {
        self.define(name, make_primitive(name, arity, func));
    }

    /// Get all bindings visible from this environment, inner bindings shadowing outer ones.
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Start with outer bindings so they can be overridden by local bindings
        if let Some(outer) = self.outer() {
            for (name, value) in outer.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in &self.frame.borrow().bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

/// Lists the bound names of each frame, innermost first. Values are omitted since
/// closures refer back to the frames that hold them.
impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut frames = f.debug_list();
        let mut current = Some(self.clone());
        while let Some(env) = current {
            let frame = env.frame.borrow();
            let mut names: Vec<&String> = frame.bindings.keys().collect();
            names.sort();
            frames.entry(&names);
            current = frame.outer.clone();
        }
        frames.finish()
    }
}

/// Keyword-triggered evaluation rules. Each receives its operands unevaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    Quote,
    AtomTest,
    Define,
    Lambda,
    Cond,
}

impl SpecialForm {
    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Quote => "quote",
            SpecialForm::AtomTest => "atom?",
            SpecialForm::Define => "define",
            SpecialForm::Lambda => "lambda",
            SpecialForm::Cond => "cond",
        }
    }

    /// Recognize an evaluated operator as a special-form keyword
    pub fn from_operator(op: &Value) -> Option<Self> {
        let Value::Symbol(name) = op else {
            return None;
        };
        match name.as_str() {
            "quote" => Some(SpecialForm::Quote),
            "atom?" => Some(SpecialForm::AtomTest),
            "define" => Some(SpecialForm::Define),
            "lambda" => Some(SpecialForm::Lambda),
            "cond" => Some(SpecialForm::Cond),
            _ => None,
        }
    }

    fn eval(self, args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
        match self {
            SpecialForm::Quote => eval_quote(args),
            SpecialForm::AtomTest => eval_atom_test(args, env, depth),
            SpecialForm::Define => eval_define(args, env, depth),
            SpecialForm::Lambda => eval_lambda(args, env),
            SpecialForm::Cond => eval_cond(args, env, depth),
        }
    }
}

impl Value {
    /// Evaluate this expression in `env`
    pub fn eval(&self, env: &Environment) -> Result<Value, Error> {
        eval(self, env)
    }
}

/// Evaluate an expression (public API)
pub fn eval(expr: &Value, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate an expression with depth tracking to prevent stack overflow.
/// `depth` counts the closure calls in progress; syntactic nesting inside a body
/// is already bounded by the parser.
fn eval_with_depth_tracking(expr: &Value, env: &Environment, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }
    match expr {
        // Unbound symbols evaluate to their own text
        Value::Symbol(name) => Ok(env.get(name).unwrap_or_else(|| expr.clone())),

        Value::List(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }

        Value::Integer(_)
        | Value::Real(_)
        | Value::Bool(_)
        | Value::Primitive { .. }
        | Value::Closure { .. }
        | Value::Unspecified => Ok(expr.clone()),
    }
}

/// Helper function to add expression context to errors, once, at the innermost list
fn add_context(error: Error, expr: &Value) -> Error {
    const MARKER: &str = "\n  Context: ";
    match error {
        Error::EvalError(msg) if !msg.contains(MARKER) => {
            Error::EvalError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(MARKER) => {
            Error::TypeError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        other => other,
    }
}

fn eval_args(args: &[Value], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth))
        .collect()
}

/// Evaluate a list: the last element is the operator, the rest are operands.
fn eval_list(elements: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    let Some((op_expr, arg_exprs)) = elements.split_last() else {
        return Err(Error::EvalError("Cannot evaluate empty list".to_owned()));
    };

    let op = eval_with_depth_tracking(op_expr, env, depth)?;

    if let Some(special_form) = SpecialForm::from_operator(&op) {
        return special_form.eval(arg_exprs, env, depth);
    }

    let args = eval_args(arg_exprs, env, depth)?;
    apply_with_depth(&op, args, env, depth)
}

/// Call a primitive or closure with already evaluated arguments.
/// `env` is the caller's environment, reported when `func` is not callable.
pub fn apply(func: &Value, args: Vec<Value>, env: &Environment) -> Result<Value, Error> {
    apply_with_depth(func, args, env, 0)
}

fn apply_with_depth(
    func: &Value,
    args: Vec<Value>,
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    match func {
        Value::Primitive { func, .. } => func(args),
        Value::Closure {
            params,
            body,
            env: closure_env,
        } => {
            let names = formal_parameters(params, closure_env, depth)?;
            trace!(params = ?names, args = args.len(), "calling closure");

            let call_env = Environment::with_bindings(names, args, closure_env);
            eval_with_depth_tracking(body, &call_env, depth + 1).map_err(|err| match err {
                Error::EvalError(msg) if !msg.contains("In lambda:") => {
                    Error::EvalError(format!("{msg}\n  In lambda: {body}"))
                }
                other => other,
            })
        }
        _ => Err(Error::not_callable(func.clone(), env)),
    }
}

/// Evaluate each element of a closure's parameter list in its defining environment.
/// Unbound names evaluate to themselves, which yields the parameter names.
fn formal_parameters(
    params: &Value,
    env: &Environment,
    depth: usize,
) -> Result<Vec<String>, Error> {
    let evaluated = match params {
        Value::List(exprs) => eval_args(exprs, env, depth)?,
        other => match eval_with_depth_tracking(other, env, depth)? {
            Value::List(names) => names,
            single => {
                return Err(Error::TypeError(format!(
                    "lambda parameters must be a list, got {}: {single}",
                    single.type_name()
                )));
            }
        },
    };

    evaluated
        .into_iter()
        .map(|param| match param {
            Value::Symbol(name) => Ok(name),
            other => Err(Error::TypeError(format!(
                "lambda parameters must be symbols, got {}: {other}",
                other.type_name()
            ))),
        })
        .collect()
}

/// Evaluate quote special form
fn eval_quote(args: &[Value]) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error_with_expr(1, args.len(), "quote".into())),
    }
}

/// Evaluate atom? special form: a literal atom, or anything not evaluating to a list
fn eval_atom_test(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [expr] if expr.is_atom() => Ok(Value::Bool(true)),
        [expr] => Ok(Value::Bool(
            eval_with_depth_tracking(expr, env, depth)?.is_atom(),
        )),
        _ => Err(Error::arity_error_with_expr(1, args.len(), "atom?".into())),
    }
}

/// Evaluate define special form. The value is evaluated before the name.
fn eval_define(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [name_expr, value_expr] => {
            let value = eval_with_depth_tracking(value_expr, env, depth)?;
            match eval_with_depth_tracking(name_expr, env, depth)? {
                Value::Symbol(name) => {
                    trace!(%name, "define");
                    env.define(name, value);
                    Ok(Value::Unspecified)
                }
                other => Err(Error::TypeError(format!(
                    "define requires a symbol name, got {}: {other}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(Error::arity_error_with_expr(2, args.len(), "define".into())),
    }
}

/// Evaluate lambda special form, capturing both operands unevaluated
fn eval_lambda(args: &[Value], env: &Environment) -> Result<Value, Error> {
    match args {
        [params, body] => Ok(Value::Closure {
            params: Box::new(params.clone()),
            body: Box::new(body.clone()),
            env: env.clone(),
        }),
        _ => Err(Error::arity_error_with_expr(2, args.len(), "lambda".into())),
    }
}

/// Evaluate cond special form. There is no else clause; no match yields no value.
fn eval_cond(args: &[Value], env: &Environment, depth: usize) -> Result<Value, Error> {
    for clause in args {
        let Value::List(pair) = clause else {
            return Err(Error::TypeError(format!(
                "cond clause must be a (test result) list, got {}: {clause}",
                clause.type_name()
            )));
        };
        let [test, result, ..] = pair.as_slice() else {
            return Err(Error::TypeError(format!(
                "cond clause must have a test and a result: {clause}"
            )));
        };
        if eval_with_depth_tracking(test, env, depth)?.is_truthy() {
            return eval_with_depth_tracking(result, env, depth);
        }
    }
    Ok(Value::Unspecified)
}

/// Create a fresh root environment holding the primitive library and the boolean
/// constants `true` and `false`
pub fn create_global_env() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        env.define(builtin_op.id, builtin_op.to_value());
    }
    env.define("true", Value::Bool(true));
    env.define("false", Value::Bool(false));

    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};
    use crate::sexpr::parse_expr;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Macro for setup expressions that produce no value (like define)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Value::Unspecified))
        };
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let env = create_global_env();

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &env, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, env: &Environment, test_id: &str) {
        let expr = match parse_expr(input) {
            Ok(expr) => expr,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (eval(&expr, env), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(
                    actual, *expected_val,
                    "{test_id}: '{input}' expected {expected_val:?}, got {actual:?}"
                );
                assert_eq!(
                    actual.type_name(),
                    expected_val.type_name(),
                    "{test_id}: '{input}' type mismatch"
                );
            }
            (Err(_), Error) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: expected error for '{input}', got {actual:?}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual:?}");
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: '{input}' expected {expected_val:?}, got error {err:?}");
            }
        }
    }

    /// Each case runs in a fresh root environment
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let env = create_global_env();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &env, &test_id);
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === ATOMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("2.5", success(2.5)),
            ("true", success(true)),
            ("false", success(false)),
            // Unbound symbols evaluate to their own text
            ("hello", success(sym("hello"))),
            ("\"x\"", success(sym("\"x\""))),
            // === ARITHMETIC (operator last) ===
            ("(3 4 +)", success(7)),
            ("(10 2 3 -)", success(5)),
            ("(2 3 4 *)", success(24)),
            ("(24 2 3 /)", success(4)),
            ("(7 2 /)", success(3.5)),
            ("(1 2.5 +)", success(3.5)),
            ("(+)", success(0)),
            ("((1 2 +) (3 4 +) *)", success(21)),
            ("(1 0 /)", SpecificError("Division by zero")),
            ("(9223372036854775807 1 +)", SpecificError("overflow")),
            ("(1 x +)", SpecificError("numeric")),
            // === COMPARISON ===
            ("(1 2 <)", success(true)),
            ("(1 2 >)", success(false)),
            ("(2.5 2 >)", success(true)),
            ("(apple banana <)", success(true)),
            ("(1 1.0 eq?)", success(true)),
            ("(a a eq?)", success(true)),
            ("(((1 2) quote) ((1 2) quote) eq?)", success(true)),
            // === QUOTE ===
            ("((1 2 3) quote)", success([1, 2, 3])),
            ("(x quote)", success(sym("x"))),
            ("((3 4 +) quote)", success(vec![val(3), val(4), sym("+")])),
            ("((() quote) quote)", success(vec![nil(), sym("quote")])),
            ("(1 2 quote)", SpecificError("ArityError")),
            // === ATOM? ===
            ("(5 atom?)", success(true)),
            ("(x atom?)", success(true)),
            ("(((1 2) quote) atom?)", success(false)),
            ("((1 2 +) atom?)", success(true)),
            ("((1 ((2) quote) cons) atom?)", success(false)),
            ("(1 2 atom?)", SpecificError("ArityError")),
            // === LIST PRIMITIVES ===
            ("(((1 2 3) quote) car)", success(1)),
            ("(((1 2 3) quote) cdr)", success([2, 3])),
            ("((() quote) cdr)", success(nil())),
            ("((() quote) car)", SpecificError("car of empty list")),
            ("(abc car)", success(sym("a"))),
            ("(1 ((2 3) quote) cons)", success([1, 2, 3])),
            ("(1 2 cons)", success([1, 2])),
            ("(1 (2 (() quote) cons) cons)", success([1, 2])),
            // === COND ===
            ("((false 1) (true 2) cond)", success(2)),
            ("((false 1) cond)", EvalResult(Value::Unspecified)),
            ("(cond)", EvalResult(Value::Unspecified)),
            ("(((1 2 <) yes) (true no) cond)", success(sym("yes"))),
            ("((0 a) (0.0 b) (1 c) cond)", success(sym("c"))),
            // The result of a non-matching clause is never evaluated
            ("((false (1 0 /)) (true ok) cond)", success(sym("ok"))),
            ("(x cond)", SpecificError("cond clause")),
            ("((x) cond)", SpecificError("cond clause")),
            // === LAMBDA AND APPLICATION ===
            ("(5 ((x) (x x +) lambda))", success(10)),
            ("(1 2 ((a b) (a b -) lambda))", success(-1)),
            // Surplus arguments are dropped
            ("(5 6 ((x) (x x +) lambda))", success(10)),
            // Surplus parameters stay unbound and evaluate to their names
            ("(5 ((x y) (x y cons) lambda))", success(vec![val(5), sym("y")])),
            ("((() 42 lambda))", success(42)),
            ("(((x) x lambda) atom?)", success(true)),
            ("(x lambda)", SpecificError("ArityError")),
            ("(1 (1 x lambda))", SpecificError("lambda parameters must be a")),
            ("(1 ((2) x lambda))", SpecificError("lambda parameters must be symbols")),
            // === DEFINE ===
            ("(x 5 define)", EvalResult(Value::Unspecified)),
            ("(x define)", SpecificError("ArityError")),
            ("(1 2 define)", SpecificError("define requires a symbol")),
            // === APPLICATION ERRORS ===
            ("(1 2 3)", SpecificError("Not callable: integer:3")),
            ("(1 2 foo)", SpecificError("Not callable: symbol:foo")),
            ("((1 2) (3 4))", SpecificError("Not callable: integer:4")),
            ("()", SpecificError("Cannot evaluate empty list")),
            ("((1 2) car)", Error),
            ("(5 (1 2 3) define)", Error),
            ("(((x) x lambda) 1 2 +)", Error),
            // Quoting never evaluates its operand, even when evaluating it would fail
            ("((1 2 3) quote)", success([1, 2, 3])),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_environment_data_driven() {
        let test_environments = vec![
            // Definition and lookup
            TestEnvironment(vec![
                test_setup!("(x 5 define)"),
                ("x", success(5)),
                ("(x 1 +)", success(6)),
                // The name operand is evaluated, so a bound name must be quoted to rebind it
                ("(x 10 define)", SpecificError("define requires a symbol name, got integer")),
                ("x", success(5)),
                test_setup!("((x quote) 10 define)"),
                ("x", success(10)),
                test_setup!("(y (x 2 *) define)"),
                ("y", success(20)),
                test_setup!("(alias (z quote) define)"),
                test_setup!("(alias 7 define)"),
                ("z", success(7)),
            ]),
            // Closures and recursion
            TestEnvironment(vec![
                test_setup!("(sq ((x) (x x *) lambda) define)"),
                ("(7 sq)", success(49)),
                ("((3 sq) sq)", success(81)),
                test_setup!(
                    "(fact ((n) (((n 1 <) 1) (true (n ((n 1 -) fact) *)) cond) lambda) define)"
                ),
                ("(5 fact)", success(120)),
                ("(10 fact)", success(3628800)),
            ]),
            // Closures capture the defining environment
            TestEnvironment(vec![
                test_setup!("(adder ((n) ((x) (x n +) lambda) lambda) define)"),
                test_setup!("(add3 (3 adder) define)"),
                test_setup!("(add10 (10 adder) define)"),
                ("(4 add3)", success(7)),
                ("(4 add10)", success(14)),
                ("(n atom?)", success(true)),
                ("n", success(sym("n"))),
            ]),
            // Captured environments are shared, not copied
            TestEnvironment(vec![
                test_setup!("(getz (() z lambda) define)"),
                ("(getz)", success(sym("z"))),
                test_setup!("(z 3 define)"),
                ("(getz)", success(3)),
            ]),
            // Definitions inside a call stay in the call's frame
            TestEnvironment(vec![
                test_setup!("(y 1 define)"),
                test_setup!("(setter ((v) ((y quote) v define) lambda) define)"),
                ("(99 setter)", EvalResult(Value::Unspecified)),
                ("y", success(1)),
            ]),
            // Operators can be computed
            TestEnvironment(vec![
                test_setup!("(op ((true +) cond) define)"),
                ("(2 3 op)", success(5)),
                test_setup!("(pick ((flag) ((flag +) (true *) cond) lambda) define)"),
                ("(2 3 (false pick))", success(6)),
                ("(2 3 (true pick))", success(5)),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_recursion_depth_limit() {
        // Run on a thread with room for the deepest permitted recursion
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                run_tests_in_environment(vec![
                    TestEnvironment(vec![
                        test_setup!(
                            "(count ((n) (((n 0 >) (((n 1 -) count) 1 +)) (true 0) cond) lambda) define)"
                        ),
                        ("(400 count)", success(400)),
                        ("(600 count)", SpecificError("depth limit exceeded")),
                        // The session is still usable after hitting the limit
                        ("(3 count)", success(3)),
                    ]),
                    TestEnvironment(vec![
                        test_setup!("(spin ((n) (n spin) lambda) define)"),
                        ("(1 spin)", SpecificError("depth limit exceeded")),
                    ]),
                ]);
            })
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_not_callable_carries_diagnostics() {
        let env = create_global_env();
        let expr = parse_expr("(1 2.5)").unwrap();

        match eval(&expr, &env).unwrap_err() {
            crate::Error::NotCallable {
                value,
                type_name,
                env: error_env,
            } => {
                assert_eq!(value, val(2.5));
                assert_eq!(type_name, "real");
                assert_eq!(error_env, env);
            }
            other => panic!("expected NotCallable, got {other:?}"),
        }
    }

    #[test]
    fn test_scope_chain_lookup() {
        let root = Environment::new();
        root.define("a", val(1));
        root.define("b", val(2));

        let child = Environment::with_bindings(
            vec!["b".to_owned(), "c".to_owned()],
            vec![val(20)],
            &root,
        );

        assert_eq!(child.get("a"), Some(val(1)));
        assert_eq!(child.get("b"), Some(val(20)));
        // Surplus names stay unbound
        assert_eq!(child.get("c"), None);
        assert!(!child.contains("c"));

        assert_eq!(child.find("b"), child);
        assert_eq!(child.find("a"), root);
        // Unbound names resolve to the outermost frame
        assert_eq!(child.find("zzz"), root);
        assert_eq!(child.outer(), Some(root.clone()));

        // Defining in the child never touches the parent
        child.define("a", val(100));
        assert_eq!(child.get("a"), Some(val(100)));
        assert_eq!(root.get("a"), Some(val(1)));

        let names: Vec<String> = child
            .get_all_bindings()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_register_builtin_function() {
        let env = create_global_env();
        env.register_builtin_function("double", Arity::Exact(1), |args| {
            match args.as_slice() {
                [Value::Integer(n)] => Ok(Value::Integer(n * 2)),
                _ => Err(crate::Error::TypeError("double requires an integer".into())),
            }
        });

        let expr = parse_expr("(21 double)").unwrap();
        assert_eq!(expr.eval(&env).unwrap(), val(42));

        let expr = parse_expr("(1 2 double)").unwrap();
        assert!(matches!(
            expr.eval(&env).unwrap_err(),
            crate::Error::ArityError { .. }
        ));
    }

    #[test]
    fn test_apply_and_special_form_lookup() {
        let env = create_global_env();
        let plus = env.get("+").unwrap();
        assert_eq!(apply(&plus, vec![val(1), val(2)], &env).unwrap(), val(3));
        assert!(matches!(
            apply(&val(1), vec![], &env),
            Err(crate::Error::NotCallable { .. })
        ));

        for form in [
            SpecialForm::Quote,
            SpecialForm::AtomTest,
            SpecialForm::Define,
            SpecialForm::Lambda,
            SpecialForm::Cond,
        ] {
            assert_eq!(SpecialForm::from_operator(&sym(form.keyword())), Some(form));
        }
        assert_eq!(SpecialForm::from_operator(&sym("car")), None);
        assert_eq!(SpecialForm::from_operator(&val(1)), None);
    }

    #[test]
    fn test_rebinding_a_keyword_symbol_disables_the_form() {
        // Operators are evaluated before dispatch, so a bound keyword resolves to its value
        let env = create_global_env();
        let define = parse_expr("(quote + define)").unwrap();
        assert_eq!(eval(&define, &env).unwrap(), Value::Unspecified);

        let expr = parse_expr("(1 2 quote)").unwrap();
        assert_eq!(eval(&expr, &env).unwrap(), val(3));
    }
}
