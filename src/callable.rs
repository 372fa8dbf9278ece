//! The call protocol and the two function-shaped callables.
//!
//! Anything invocable (native functions, user-defined closures, classes)
//! implements [`Callable`].  The interpreter is passed into `call` so user
//! functions can execute their bodies and natives can reach the output
//! stream.  Arity is checked by the interpreter *before* dispatch, so `call`
//! implementations may assume `arguments.len() == self.arity()`.

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::class::Instance;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::interpreter::{Control, Interpreter};
use crate::value::Value;

/// The capability shared by every invocable value.
pub trait Callable {
    /// Number of arguments this callable requires.
    fn arity(&self) -> usize;

    /// Invoke with exactly `arity()` arguments.
    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError>;
}

/// Host-provided function installed in the global environment.
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: fn(&mut Interpreter, &[Value]) -> Result<Value, String>,
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        debug!("Calling native function '{}'", self.name);

        (self.func)(interpreter, &arguments).map_err(RuntimeError::Native)
    }
}

/// A user-defined function value: the declaration plus the environment that
/// was current at its declaration site (the closure).
///
/// Immutable after creation; [`Function::bind`] produces a *new* function
/// whose closure is extended by one scope holding `this`.
#[derive(Debug)]
pub struct Function {
    pub declaration: Rc<FunctionDecl>,
    pub closure: Rc<RefCell<Environment>>,
    pub is_initializer: bool,
}

impl Function {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Function {
            declaration,
            closure,
            is_initializer,
        }
    }

    /// Specialise this method to one instance: same declaration, closure
    /// wrapped in one extra environment binding `this`.  The original
    /// function is left untouched.
    pub fn bind(&self, instance: Rc<RefCell<Instance>>) -> Function {
        let mut environment = Environment::with_enclosing(Rc::clone(&self.closure));
        environment.define("this", Value::Instance(instance));

        Function {
            declaration: Rc::clone(&self.declaration),
            closure: Rc::new(RefCell::new(environment)),
            is_initializer: self.is_initializer,
        }
    }

    /// The `this` binding of a bound initializer.  Only valid on functions
    /// created with `is_initializer` through [`Function::bind`].
    fn bound_this(&self) -> Value {
        Environment::get_at(&self.closure, 0, "this")
    }
}

impl Callable for Function {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        debug!(
            "Calling function '{}' with {} argument(s)",
            self.declaration.name.lexeme,
            arguments.len()
        );

        // Each call gets its own environment, chained to the *closure*,
        // not the caller's environment.  This is what makes scoping lexical
        // rather than dynamic.
        let mut environment = Environment::with_enclosing(Rc::clone(&self.closure));

        for (param, argument) in self.declaration.params.iter().zip(arguments) {
            environment.define(&param.lexeme, argument);
        }

        let control: Control = interpreter
            .execute_block(&self.declaration.body, Rc::new(RefCell::new(environment)))?;

        // An initializer always yields the constructed instance, whatever
        // the body did.
        let value: Value = match control {
            Control::Return(value) if !self.is_initializer => value,
            _ if self.is_initializer => self.bound_this(),
            _ => Value::Nil,
        };

        Ok(value)
    }
}
