//! Program sessions.
//!
//! A [`Program`] owns a root environment, the top-level forms parsed from its source
//! and the buffer that its `print` primitive writes to. Whole programs are parsed up
//! front and evaluated in order; REPL sessions start empty and take one statement at
//! a time.
//!
//! ```
//! use oplast::Program;
//!
//! let mut program = Program::new("(sq ((x) (x x *) lambda) define) (7 print) (6 sq)").unwrap();
//! assert_eq!(program.eval().unwrap(), "7\n36");
//! ```

use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::Value;
use crate::builtinops::{OutputBuffer, print_primitive};
use crate::evaluator::{Environment, create_global_env, eval};
use crate::sexpr::parse_program;

pub struct Program {
    env: Environment,
    forms: Vec<Value>,
    stdout: OutputBuffer,
}

impl Program {
    /// Parse a whole program. Empty source is a syntax error.
    pub fn new(source: &str) -> Result<Self, Error> {
        Self::with_bindings(source, Vec::new())
    }

    /// Parse a whole program whose root environment also holds host-supplied bindings.
    /// They are installed after the primitive library and may replace primitives.
    pub fn with_bindings(
        source: &str,
        bindings: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<Self, Error> {
        let forms = parse_program(source)?;
        debug!(forms = forms.len(), "parsed program");

        let mut program = Self::repl();
        for (name, value) in bindings {
            program.env.define(name, value);
        }
        program.forms = forms;
        Ok(program)
    }

    /// An empty interactive session
    pub fn repl() -> Self {
        let stdout = OutputBuffer::default();
        let env = create_global_env();
        env.define("print", print_primitive(Rc::clone(&stdout)));
        Program {
            env,
            forms: Vec::new(),
            stdout,
        }
    }

    /// Evaluate every form in order and render the result: buffered print output first,
    /// then the last form's value, joined by a newline. A last form without a value
    /// renders as the empty string.
    ///
    /// A failing form discards the print output buffered so far.
    pub fn eval(&mut self) -> Result<String, Error> {
        let outcome = self
            .forms
            .iter()
            .enumerate()
            .try_fold(Value::Unspecified, |_, (index, form)| {
                debug!(index, %form, "evaluating top-level form");
                eval(form, &self.env)
            });
        match outcome {
            Ok(last) => Ok(self.render(&last)),
            Err(err) => Err(self.discard_output(err)),
        }
    }

    /// Parse and evaluate one statement in this session, keeping its definitions.
    /// Every form in `source` is evaluated; the output is rendered as in [`Program::eval`].
    pub fn run_statement(&mut self, source: &str) -> Result<String, Error> {
        let forms = parse_program(source)?;
        let mut last = Value::Unspecified;
        for form in forms {
            debug!(%form, "evaluating statement");
            let result = eval(&form, &self.env);
            self.forms.push(form);
            match result {
                Ok(value) => last = value,
                Err(err) => return Err(self.discard_output(err)),
            }
        }
        Ok(self.render(&last))
    }

    fn discard_output(&mut self, err: Error) -> Error {
        let dropped = self.take_stdout();
        if !dropped.is_empty() {
            debug!(%dropped, "discarding print output of failed evaluation");
        }
        err
    }

    /// Drain the print buffer, joining lines with newlines
    pub fn take_stdout(&mut self) -> String {
        let lines = std::mem::take(&mut *self.stdout.borrow_mut());
        lines.join("\n")
    }

    fn render(&mut self, value: &Value) -> String {
        let value_text = match value {
            Value::Unspecified => String::new(),
            other => other.to_string(),
        };
        let printed = self.take_stdout();
        if printed.is_empty() {
            value_text
        } else {
            format!("{printed}\n{value_text}")
        }
    }

    pub fn forms(&self) -> &[Value] {
        &self.forms
    }

    /// The session's root environment
    pub fn env(&self) -> &Environment {
        &self.env
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, form) in self.forms.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{form}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("forms", &self.forms)
            .field("env", &self.env)
            .finish()
    }
}
