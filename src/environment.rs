//! Lexical environment chain: a mutable name→value map per scope with a link
//! to the enclosing scope.
//!
//! Scopes are shared (`Rc<RefCell<_>>`) because closures and bound methods
//! keep their defining environment alive after the call frame that created it
//! has returned.  The resolver-backed accessors (`get_at` / `assign_at`) walk
//! a distance the resolver proved valid; a miss there is an interpreter bug,
//! not a user error, and panics.

use crate::error::RuntimeError;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    /// The global scope, which ends the chain.
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    /// A local scope nested inside the given outer one.
    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Insert or overwrite `name` in this scope.  Never fails.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Look `name` up in this scope, then the enclosing chain.
    pub fn get(&self, name: &str, line: usize) -> Result<Value, RuntimeError> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name, line)
        } else {
            Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
                line,
            })
        }
    }

    /// Mutate the first scope in the chain that already defines `name`.
    /// Assignment never creates a binding.
    pub fn assign(&mut self, name: &str, value: Value, line: usize) -> Result<(), RuntimeError> {
        if self.values.contains_key(name) {
            self.values.insert(name.to_string(), value);
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value, line)
        } else {
            Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
                line,
            })
        }
    }

    /// Walk exactly `distance` enclosing links.
    ///
    /// The resolver established that the chain is at least that deep, so a
    /// short chain is an internal invariant violation.
    fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut current: Rc<RefCell<Environment>> = Rc::clone(env);

        for _ in 0..distance {
            let next: Rc<RefCell<Environment>> = current
                .borrow()
                .enclosing
                .as_ref()
                .map(Rc::clone)
                .expect("resolver recorded a distance deeper than the environment chain");

            current = next;
        }

        current
    }

    /// Read `name` at exactly `distance` hops.  Existence is guaranteed by
    /// the resolver; a miss panics.
    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &str) -> Value {
        Environment::ancestor(env, distance)
            .borrow()
            .values
            .get(name)
            .cloned()
            .expect("resolver-bound variable missing from its scope")
    }

    /// Write `name` at exactly `distance` hops.  Same guarantee as
    /// [`Environment::get_at`].
    pub fn assign_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &str, value: Value) {
        Environment::ancestor(env, distance)
            .borrow_mut()
            .values
            .insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(env: Environment) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(env))
    }

    #[test]
    fn define_then_get() {
        let mut env = Environment::new();
        env.define("a", Value::Number(1.0));

        assert_eq!(env.get("a", 1).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn get_falls_through_to_enclosing() {
        let globals = shared(Environment::new());
        globals.borrow_mut().define("a", Value::Number(1.0));

        let local = Environment::with_enclosing(Rc::clone(&globals));

        assert_eq!(local.get("a", 1).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn assign_mutates_the_defining_scope() {
        let globals = shared(Environment::new());
        globals.borrow_mut().define("a", Value::Number(1.0));

        let mut local = Environment::with_enclosing(Rc::clone(&globals));
        local.assign("a", Value::Number(2.0), 1).unwrap();

        assert_eq!(globals.borrow().get("a", 1).unwrap(), Value::Number(2.0));
    }

    #[test]
    fn assign_never_creates_a_binding() {
        let mut env = Environment::new();

        let err = env.assign("ghost", Value::Nil, 3).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::UndefinedVariable { ref name, line: 3 } if name == "ghost"
        ));
    }

    #[test]
    fn get_at_walks_the_recorded_distance() {
        let outer = shared(Environment::new());
        outer.borrow_mut().define("a", Value::Number(1.0));

        let middle = shared(Environment::with_enclosing(Rc::clone(&outer)));
        middle.borrow_mut().define("a", Value::Number(2.0));

        let inner = shared(Environment::with_enclosing(Rc::clone(&middle)));

        assert_eq!(
            Environment::get_at(&inner, 1, "a"),
            Value::Number(2.0),
            "distance 1 must hit the middle scope"
        );
        assert_eq!(Environment::get_at(&inner, 2, "a"), Value::Number(1.0));
    }
}
