//! Tree-walking evaluator for Opal.
//!
//! The interpreter keeps a mutable "current environment" pointer, initialized
//! to the global environment and saved/restored around every nested
//! execution, so early returns and runtime errors can never leak a stale
//! environment.  Evaluation is a depth-first post-order walk: operands are
//! evaluated before the operator is applied.
//!
//! `return` is *not* modelled as an unwinding signal.  Statement execution
//! yields a [`Control`] value, `Normal` or `Return(value)`, propagated
//! upward until the nearest call boundary consumes it, so the error channel
//! carries only genuine runtime failures.
//!
//! Variable references resolved by the [`Resolver`](crate::resolver::Resolver)
//! are fetched with a fixed-hop environment walk; everything else falls back
//! to the global scope.  The distance map is handed to [`Interpreter::interpret`]
//! explicitly and accumulated, so a REPL can keep one interpreter alive
//! across many resolved chunks.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::rc::Rc;

use log::{debug, info};

use crate::ast::{Expr, ExprId, LiteralValue, Stmt};
use crate::callable::{Callable, Function};
use crate::class::{Class, Instance};
use crate::environment::Environment;
use crate::error::{Result, RuntimeError};
use crate::resolver::Locals;
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Outcome of executing one statement: either fall through to the next, or
/// unwind to the nearest enclosing call boundary carrying the return value.
#[derive(Debug)]
pub enum Control {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: Locals,
    out: Box<dyn io::Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// Interpreter printing to stdout, with the native registry installed.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Interpreter printing to an injected sink.  Tests hand in a shared
    /// buffer to capture program output.
    pub fn with_output(out: Box<dyn io::Write>) -> Self {
        info!("Initializing Interpreter");

        let globals: Rc<RefCell<Environment>> = Rc::new(RefCell::new(Environment::new()));

        crate::native::install(&mut globals.borrow_mut());

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            out,
        }
    }

    /// Executes a program: the statement list plus the resolver's distance
    /// map for it.  Stops at the first runtime error and returns it; the
    /// interpreter stays usable for a following, independent call.
    pub fn interpret(&mut self, statements: &[Stmt], locals: Locals) -> Result<()> {
        debug!(
            "Interpreting {} statement(s), {} resolved local(s)",
            statements.len(),
            locals.len()
        );

        // Accumulated, not replaced: closures built by earlier chunks keep
        // their resolved distances valid in this one.
        self.locals.extend(locals);

        for stmt in statements {
            if let Control::Return(_) = self.execute(stmt)? {
                unreachable!("resolver rejects 'return' outside a function");
            }
        }

        info!("Interpretation completed successfully");
        Ok(())
    }

    // ─────────────────────────── statements ───────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> std::result::Result<Control, RuntimeError> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Control::Normal)
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                debug!("Printing value: {}", value);

                // No trailing newline: the `println()` native supplies it.
                self.emit(&value.to_string())?;
                Ok(Control::Normal)
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Defining variable '{}' = {}", name.lexeme, value);

                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(Control::Normal)
            }

            Stmt::Block(statements) => {
                let environment =
                    Environment::with_enclosing(Rc::clone(&self.environment));

                self.execute_block(statements, Rc::new(RefCell::new(environment)))
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(Control::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    match self.execute(body)? {
                        Control::Normal => {}
                        ret @ Control::Return(_) => return Ok(ret),
                    }
                }

                Ok(Control::Normal)
            }

            Stmt::Function(declaration) => {
                debug!("Defining function '{}'", declaration.name.lexeme);

                // The closure captures the environment current at the
                // declaration site.
                let function = Function::new(
                    Rc::clone(declaration),
                    Rc::clone(&self.environment),
                    false,
                );

                self.environment
                    .borrow_mut()
                    .define(&declaration.name.lexeme, Value::Function(Rc::new(function)));

                Ok(Control::Normal)
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Returning value: {}", value);
                Ok(Control::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Executes a list of statements with `environment` as the current
    /// scope, restoring the previous scope on every exit path.
    pub(crate) fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> std::result::Result<Control, RuntimeError> {
        let previous: Rc<RefCell<Environment>> =
            std::mem::replace(&mut self.environment, environment);

        let result = self.run_sequence(statements);

        // Errors are values here, so this restore runs on failure too.
        self.environment = previous;

        result
    }

    fn run_sequence(&mut self, statements: &[Stmt]) -> std::result::Result<Control, RuntimeError> {
        for stmt in statements {
            match self.execute(stmt)? {
                Control::Normal => {}
                ret @ Control::Return(_) => return Ok(ret),
            }
        }

        Ok(Control::Normal)
    }

    /// Class declaration: evaluate the superclass, pre-declare the class
    /// name (so method bodies can refer to it), wrap the methods' closure in
    /// a `super` scope when inheriting, build the method table, then patch
    /// the binding with the finished class.
    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<crate::ast::FunctionDecl>],
    ) -> std::result::Result<Control, RuntimeError> {
        debug!("Declaring class '{}'", name.lexeme);

        let superclass_value: Option<Rc<Class>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    return Err(RuntimeError::InvalidSuperclass { line: expr.line() });
                }
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil);

        let previous: Rc<RefCell<Environment>> = Rc::clone(&self.environment);

        if let Some(superclass_class) = &superclass_value {
            let mut environment = Environment::with_enclosing(Rc::clone(&self.environment));
            environment.define("super", Value::Class(Rc::clone(superclass_class)));

            self.environment = Rc::new(RefCell::new(environment));
        }

        let mut method_table: HashMap<String, Rc<Function>> = HashMap::new();

        for method in methods {
            let is_initializer: bool = method.name.lexeme == "init";

            let function = Function::new(
                Rc::clone(method),
                Rc::clone(&self.environment),
                is_initializer,
            );

            method_table.insert(method.name.lexeme.clone(), Rc::new(function));
        }

        let class = Class::new(name.lexeme.clone(), superclass_value, method_table);

        if superclass.is_some() {
            self.environment = previous;
        }

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, Value::Class(Rc::new(class)), name.line)?;

        Ok(Control::Normal)
    }

    // ─────────────────────────── expressions ──────────────────────────

    pub fn evaluate(&mut self, expr: &Expr) -> std::result::Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_value: Value = self.evaluate(left)?;

                // Short-circuit: the left value itself is the result when it
                // decides the outcome.
                match operator.token_type {
                    TokenType::OR if is_truthy(&left_value) => Ok(left_value),
                    TokenType::AND if !is_truthy(&left_value) => Ok(left_value),
                    _ => self.evaluate(right),
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => {
                        Environment::assign_at(
                            &self.environment,
                            distance,
                            &name.lexeme,
                            value.clone(),
                        );
                    }
                    None => {
                        self.globals.borrow_mut().assign(
                            &name.lexeme,
                            value.clone(),
                            name.line,
                        )?;
                    }
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_value: Value = self.evaluate(callee)?;

                let mut argument_values: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    argument_values.push(self.evaluate(argument)?);
                }

                self.invoke(&callee_value, paren, argument_values)
            }

            Expr::Get { object, name } => {
                let object_value: Value = self.evaluate(object)?;

                match object_value {
                    Value::Instance(instance) => Instance::get(&instance, name),
                    _ => Err(RuntimeError::NotAnObject { line: name.line }),
                }
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let object_value: Value = self.evaluate(object)?;

                let Value::Instance(instance) = object_value else {
                    return Err(RuntimeError::NotAnObject { line: name.line });
                };

                let value: Value = self.evaluate(value)?;
                instance.borrow_mut().set(name, value.clone());

                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    /// Resolver-backed lookup: fixed-hop walk when a distance was recorded,
    /// global lookup otherwise.
    fn look_up_variable(
        &self,
        id: ExprId,
        name: &Token,
    ) -> std::result::Result<Value, RuntimeError> {
        match self.locals.get(&id) {
            Some(&distance) => Ok(Environment::get_at(
                &self.environment,
                distance,
                &name.lexeme,
            )),
            None => self.globals.borrow().get(&name.lexeme, name.line),
        }
    }

    /// `super.method`: the method is looked up starting at the superclass of
    /// the class that lexically encloses the call, then bound to the
    /// *current* `this`, which is why the inherited method runs with the
    /// subclass instance's state.
    fn evaluate_super(
        &mut self,
        id: ExprId,
        keyword: &Token,
        method: &Token,
    ) -> std::result::Result<Value, RuntimeError> {
        let distance: usize = *self
            .locals
            .get(&id)
            .expect("unresolved 'super' reached evaluation");

        let Value::Class(superclass) = Environment::get_at(&self.environment, distance, "super")
        else {
            unreachable!("'super' bound to a non-class value");
        };

        // The `this` scope sits exactly one environment inside `super`.
        let Value::Instance(object) =
            Environment::get_at(&self.environment, distance - 1, "this")
        else {
            unreachable!("'this' bound to a non-instance value");
        };

        let method_fn = superclass.find_method(&method.lexeme).ok_or_else(|| {
            RuntimeError::UndefinedProperty {
                name: method.lexeme.clone(),
                line: method.line,
            }
        })?;

        debug!(
            "Bound super method '{}' from class '{}' [line {}]",
            method.lexeme, superclass.name, keyword.line
        );

        Ok(Value::Function(Rc::new(method_fn.bind(object))))
    }

    /// Evaluates a unary expression.
    fn evaluate_unary(
        &mut self,
        operator: &Token,
        right: &Expr,
    ) -> std::result::Result<Value, RuntimeError> {
        let right_value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right_value {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::type_error(
                    operator.line,
                    "Operand must be a number.",
                )),
            },

            TokenType::BANG => Ok(Value::Bool(!is_truthy(&right_value))),

            _ => unreachable!("parser only builds '!' and '-' unary operators"),
        }
    }

    /// Evaluates a binary expression.
    fn evaluate_binary(
        &mut self,
        left: &Expr,
        operator: &Token,
        right: &Expr,
    ) -> std::result::Result<Value, RuntimeError> {
        let left_value: Value = self.evaluate(left)?;
        let right_value: Value = self.evaluate(right)?;

        match operator.token_type {
            TokenType::PLUS => match (left_value, right_value) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                _ => Err(RuntimeError::type_error(
                    operator.line,
                    "Operands must be two numbers or two strings.",
                )),
            },

            TokenType::MINUS => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Number(a - b))
            }

            TokenType::STAR => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Number(a * b))
            }

            TokenType::SLASH => {
                let (a, b) = number_operands(operator, left_value, right_value)?;

                if b == 0.0 {
                    Err(RuntimeError::DivisionByZero {
                        line: operator.line,
                    })
                } else {
                    Ok(Value::Number(a / b))
                }
            }

            TokenType::PERCENT => {
                let (a, b) = number_operands(operator, left_value, right_value)?;

                if b == 0.0 {
                    Err(RuntimeError::DivisionByZero {
                        line: operator.line,
                    })
                } else {
                    Ok(Value::Number(a % b))
                }
            }

            TokenType::CARET => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Number(a.powf(b)))
            }

            TokenType::GREATER => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a > b))
            }

            TokenType::GREATER_EQUAL => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a >= b))
            }

            TokenType::LESS => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a < b))
            }

            TokenType::LESS_EQUAL => {
                let (a, b) = number_operands(operator, left_value, right_value)?;
                Ok(Value::Bool(a <= b))
            }

            // Equality supports operands of any type, even mixed ones, and
            // never fails.
            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left_value == right_value)),
            TokenType::BANG_EQUAL => Ok(Value::Bool(left_value != right_value)),

            _ => unreachable!("parser only builds known binary operators"),
        }
    }

    /// Dispatches a call through the [`Callable`] protocol, checking arity
    /// first so no callable body ever runs with the wrong argument count.
    fn invoke(
        &mut self,
        callee: &Value,
        paren: &Token,
        arguments: Vec<Value>,
    ) -> std::result::Result<Value, RuntimeError> {
        let callable: &dyn Callable = match callee {
            Value::Native(native) => native.as_ref(),
            Value::Function(function) => function.as_ref(),
            Value::Class(class) => class,
            _ => {
                return Err(RuntimeError::NotCallable { line: paren.line });
            }
        };

        if arguments.len() != callable.arity() {
            return Err(RuntimeError::ArityMismatch {
                expected: callable.arity(),
                got: arguments.len(),
                line: paren.line,
            });
        }

        callable.call(self, arguments)
    }

    /// Writes program output to the injected sink, flushing so prints
    /// interleave correctly with host output.
    pub(crate) fn emit(&mut self, text: &str) -> std::result::Result<(), RuntimeError> {
        self.out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| RuntimeError::Native(format!("I/O error while printing: {}", e)))
    }
}

/// `nil` and `false` are the only falsy values; everything else (including
/// `0` and `""`) is truthy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Nil => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::True => Value::Bool(true),
        LiteralValue::False => Value::Bool(false),
        LiteralValue::Nil => Value::Nil,
    }
}

/// Both operands must be numbers for arithmetic and comparison operators.
fn number_operands(
    operator: &Token,
    left: Value,
    right: Value,
) -> std::result::Result<(f64, f64), RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((a, b)),
        _ => Err(RuntimeError::type_error(
            operator.line,
            "Operands must be numbers.",
        )),
    }
}
