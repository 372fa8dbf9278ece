//! Native function registry.
//!
//! Installed once into the global environment at interpreter construction.
//! Each native exposes a fixed arity and dispatches through the same
//! [`Callable`](crate::callable::Callable) protocol as user functions, so a
//! program cannot tell them apart at a call site.

use std::rc::Rc;

use chrono::Utc;
use log::debug;

use crate::callable::NativeFunction;
use crate::environment::Environment;
use crate::interpreter::Interpreter;
use crate::value::Value;

/// Defines the full native registry in `globals`.
pub fn install(globals: &mut Environment) {
    debug!("Installing native functions");

    define(globals, "clock", 0, clock);
    define(globals, "sin", 1, sin);
    define(globals, "cos", 1, cos);
    define(globals, "sqrt", 1, sqrt);
    define(globals, "Max", 2, max);
    define(globals, "Min", 2, min);
    define(globals, "println", 0, println);
}

fn define(
    globals: &mut Environment,
    name: &str,
    arity: usize,
    func: fn(&mut Interpreter, &[Value]) -> Result<Value, String>,
) {
    globals.define(
        name,
        Value::Native(Rc::new(NativeFunction {
            name: name.to_string(),
            arity,
            func,
        })),
    );
}

/// Extract a numeric argument or fail with the native's name.
fn number_arg(name: &str, arguments: &[Value], index: usize) -> Result<f64, String> {
    match arguments[index] {
        Value::Number(n) => Ok(n),
        ref other => Err(format!(
            "{}: argument {} must be a number, got {}",
            name,
            index + 1,
            other
        )),
    }
}

/// Seconds since the Unix epoch, with sub-second precision.
fn clock(_interpreter: &mut Interpreter, _arguments: &[Value]) -> Result<Value, String> {
    let seconds: f64 = Utc::now().timestamp_millis() as f64 / 1000.0;

    Ok(Value::Number(seconds))
}

/// Sine of an angle given in degrees.
fn sin(_interpreter: &mut Interpreter, arguments: &[Value]) -> Result<Value, String> {
    let degrees: f64 = number_arg("sin", arguments, 0)?;

    Ok(Value::Number(degrees.to_radians().sin()))
}

/// Cosine of an angle given in degrees.
fn cos(_interpreter: &mut Interpreter, arguments: &[Value]) -> Result<Value, String> {
    let degrees: f64 = number_arg("cos", arguments, 0)?;

    Ok(Value::Number(degrees.to_radians().cos()))
}

fn sqrt(_interpreter: &mut Interpreter, arguments: &[Value]) -> Result<Value, String> {
    let n: f64 = number_arg("sqrt", arguments, 0)?;

    Ok(Value::Number(n.sqrt()))
}

fn max(_interpreter: &mut Interpreter, arguments: &[Value]) -> Result<Value, String> {
    let a: f64 = number_arg("Max", arguments, 0)?;
    let b: f64 = number_arg("Max", arguments, 1)?;

    Ok(Value::Number(a.max(b)))
}

fn min(_interpreter: &mut Interpreter, arguments: &[Value]) -> Result<Value, String> {
    let a: f64 = number_arg("Min", arguments, 0)?;
    let b: f64 = number_arg("Min", arguments, 1)?;

    Ok(Value::Number(a.min(b)))
}

/// Writes a newline.  `print` itself never emits one.
fn println(interpreter: &mut Interpreter, _arguments: &[Value]) -> Result<Value, String> {
    interpreter.emit("\n").map_err(|e| e.to_string())?;

    Ok(Value::Nil)
}
