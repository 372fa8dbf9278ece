//! Static resolver pass for the Opal interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<String, bool>` tracking
//!    declared/defined).
//! 2. Report static errors (redeclaration, forward-read in initializer,
//!    invalid `return`, invalid `this`/`super`, self-inheritance).
//! 3. Record, for *each* resolvable expression, whether it is a local (and
//!    at what depth) or a global, so the interpreter never falls back to a
//!    dynamic lookup that would see a later shadowing local.
//!
//! The pass never evaluates anything and has no side effect beyond the
//! [`Locals`] map it returns and the errors it collects.  Errors do not stop
//! the walk; every static error in the program is reported in one pass, and
//! a non-empty error list means evaluation must not run.
//!
//! The scope nesting built for classes mirrors what the interpreter builds at
//! runtime (an optional `super` scope enclosing a `this` scope enclosing
//! each method) so the recorded distances line up with the environment
//! chain.

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::OpalError;
use crate::token::Token;
use log::{debug, info};
use std::collections::{HashMap, HashSet};

/// The resolver's output: hop count from a reference site to the scope that
/// declares the name, keyed by the expression's parser-assigned id.
/// References absent from the map are globals.
pub type Locals = HashMap<ExprId, usize>;

/// What kind of function body are we inside?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

/// What kind of class body are we inside?  Used to validate `this`/`super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// distances (locals vs. globals).
pub struct Resolver {
    scopes: Vec<HashMap<String, bool>>, // false=declared, true=defined
    locals: Locals,
    /// Top-level names declared so far.  The global scope is never pushed,
    /// but the self-reference check below needs to know whether a global
    /// could supply a name.
    globals_seen: HashSet<String>,
    current_function: FunctionType,
    current_class: ClassType,
    errors: Vec<OpalError>,
}

impl Default for Resolver {
    fn default() -> Self {
        Resolver::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        info!("Resolver instantiated");

        Resolver {
            scopes: Vec::new(),
            locals: HashMap::new(),
            globals_seen: HashSet::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            errors: Vec::new(),
        }
    }

    /// Walk all top-level statements.  Returns the distance map, or every
    /// static error found.
    pub fn resolve(mut self, statements: &[Stmt]) -> Result<Locals, Vec<OpalError>> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt);
        }

        if self.errors.is_empty() {
            Ok(self.locals)
        } else {
            Err(self.errors)
        }
    }

    fn error<S: Into<String>>(&mut self, line: usize, message: S) {
        self.errors.push(OpalError::resolve(line, message));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        debug!("Resolving stmt: {:?}", stmt);

        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                for s in statements {
                    self.resolve_stmt(s);
                }
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define, so the initializer
                // still sees an outer binding of the same name, while a
                // self-read is caught as a static error.
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(declaration) => {
                // A function's name is visible inside its own body.
                self.declare(&declaration.name);
                self.define(&declaration.name);
                self.resolve_function(declaration, FunctionType::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword.line, "Cannot return from top-level code");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword.line, "Cannot return a value from an initializer");
                    }

                    self.resolve_expr(expr);
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                let enclosing_class: ClassType = self.current_class;
                self.current_class = ClassType::Class;

                self.declare(name);
                self.define(name);

                if let Some(superclass_expr) = superclass {
                    if let Expr::Variable {
                        name: superclass_name,
                        ..
                    } = superclass_expr
                    {
                        if superclass_name.lexeme == name.lexeme {
                            self.error(
                                superclass_name.line,
                                "A class cannot inherit from itself",
                            );
                        }
                    }

                    self.current_class = ClassType::Subclass;
                    self.resolve_expr(superclass_expr);

                    // Scope holding `super`, mirroring the environment the
                    // interpreter wraps around the methods at runtime.
                    self.begin_scope();
                    self.scope_define("super");
                }

                // Scope holding `this`, enclosing every method body.
                self.begin_scope();
                self.scope_define("this");

                for method in methods {
                    let declaration_type: FunctionType = if method.name.lexeme == "init" {
                        FunctionType::Initializer
                    } else {
                        FunctionType::Method
                    };

                    self.resolve_function(method, declaration_type);
                }

                self.end_scope();

                if superclass.is_some() {
                    self.end_scope();
                }

                self.current_class = enclosing_class;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        debug!("Resolving expr: {:?}", expr);

        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner);
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right);
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                // First resolve the RHS, then bind the target.
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword.line, "Cannot use 'this' outside of a class");
                    return;
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassType::None => {
                        self.error(keyword.line, "Cannot use 'super' outside of a class");
                        return;
                    }
                    ClassType::Class => {
                        self.error(
                            keyword.line,
                            "Cannot use 'super' in a class with no superclass",
                        );
                        return;
                    }
                    ClassType::Subclass => {}
                }

                self.resolve_local(*id, keyword);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body.
    fn resolve_function(&mut self, declaration: &FunctionDecl, function_type: FunctionType) {
        let enclosing: FunctionType = self.current_function;
        self.current_function = function_type;

        self.begin_scope();
        for param in &declaration.params {
            self.declare(param);
            self.define(param);
        }
        for stmt in &declaration.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();

        self.current_function = enclosing;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        match self.scopes.last_mut() {
            Some(scope) => {
                if scope.contains_key(&name.lexeme) {
                    self.errors.push(OpalError::resolve(
                        name.line,
                        "Variable already declared in this scope",
                    ));
                }

                scope.insert(name.lexeme.clone(), false);
            }

            // Top level: no scope to track, but remember the name so the
            // self-reference check knows a global can supply it.
            None => {
                self.globals_seen.insert(name.lexeme.clone());
            }
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    /// Define a synthetic binding (`this`, `super`) in the current scope.
    fn scope_define(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Binding-distance helper
    // ─────────────────────────────────────────────────────────────────────

    /// Record this reference as either a local at depth `d`, or a global if
    /// not found in *any* scope (globals are looked up dynamically at
    /// runtime and are not recorded).
    ///
    /// A name marked "not yet defined" is the declaration whose initializer
    /// is being resolved right now, so the search skips it: in
    /// `var a = 1; { var a = a + 1; }` the inner initializer reads the outer
    /// `a`.  When the skipped entry is the *only* candidate (no enclosing
    /// scope and no previously declared global could supply the name) the
    /// variable can only be referencing itself, which is a static error.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        let mut skipped_in_flight = false;

        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            match scope.get(&name.lexeme) {
                Some(true) => {
                    debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                    self.locals.insert(id, depth);
                    return;
                }

                Some(false) => {
                    skipped_in_flight = true;
                }

                None => {}
            }
        }

        if skipped_in_flight && !self.globals_seen.contains(&name.lexeme) {
            self.error(
                name.line,
                format!(
                    "Cannot read variable '{}' in its own initializer",
                    name.lexeme
                ),
            );
            return;
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}
