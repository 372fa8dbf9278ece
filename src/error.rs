//! Centralised error hierarchy for the **Opal interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime, CLI) convert their
//! internal failure modes into one of the variants defined here.  This enables
//! a uniform `Result<T>` alias throughout the crate and ergonomic
//! inter-operation with `anyhow`, while still preserving rich diagnostic
//! detail.
//!
//! The module **does not** print diagnostics itself.  Runtime failures get
//! their own enum, [`RuntimeError`], with one variant per failure kind so a
//! new kind is a compile-time-checked addition at every match site.

use std::io;
use thiserror::Error;

use log::info;

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OpalError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human-readable description.
        message: String,

        /// 1-based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.
    #[error("[line {line}] Error: {message}")]
    Parse { message: String, line: usize },

    /// Static-analysis failure found by the resolver before execution.
    #[error("[line {line}] Error: {message}")]
    Resolve { message: String, line: usize },

    /// Runtime evaluation error.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// UTF-8 decoding failure when ingesting external text.
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl OpalError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        OpalError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", line, message);

        OpalError::Parse { message, line }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", line, message);

        OpalError::Resolve { message, line }
    }
}

/// Every way evaluation can fail at runtime.
///
/// Each variant carries the 1-based source line of the offending token so the
/// driver can point at the failure.  Exactly one of these aborts the current
/// `interpret` call; interpreter state stays usable for the next call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A name was read or assigned that no scope in the chain defines.
    #[error("Undefined variable '{name}'. [line {line}]")]
    UndefinedVariable { name: String, line: usize },

    /// An operand had the wrong type for the operator applied to it.
    #[error("{message} [line {line}]")]
    Type { message: String, line: usize },

    /// A callable was invoked with the wrong number of arguments.
    #[error("Expected {expected} arguments but got {got}. [line {line}]")]
    ArityMismatch {
        expected: usize,
        got: usize,
        line: usize,
    },

    /// The callee expression did not evaluate to a callable value.
    #[error("Can only call functions and classes. [line {line}]")]
    NotCallable { line: usize },

    /// Property access on a value that is not an instance.
    #[error("Only instances have properties. [line {line}]")]
    NotAnObject { line: usize },

    /// Neither a field nor a method with this name exists on the instance.
    #[error("Undefined property '{name}'. [line {line}]")]
    UndefinedProperty { name: String, line: usize },

    /// The expression after `<` in a class declaration was not a class.
    #[error("Superclass must be a class. [line {line}]")]
    InvalidSuperclass { line: usize },

    /// Division or modulus with a zero right-hand side.
    #[error("Division by zero. [line {line}]")]
    DivisionByZero { line: usize },

    /// A native function reported a failure of its own.
    #[error("{0}")]
    Native(String),
}

impl RuntimeError {
    /// Helper constructor for operand-type failures.
    pub fn type_error<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Type error: line={}, msg={}", line, message);

        RuntimeError::Type { message, line }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, OpalError>;
