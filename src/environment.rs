use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LoxError, Result};
use crate::object::Object;
use crate::token::Token;

/// A lexical scope: a name-to-value map plus an optional link to the
/// enclosing scope. The chain is logical, not tree-shaped — each child
/// holds one parent, shared via `Rc<RefCell<_>>` since closures, instances,
/// and active calls may all keep a scope alive after its block has
/// returned. Method closures bound to `this` can form reference cycles
/// through an instance's class; we accept the leak rather than add a
/// garbage collector.
pub struct Environment {
    values: HashMap<String, Object>,
    pub enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Self {
            values: HashMap::new(),
            enclosing: None,
        }))
    }

    pub fn with_enclosing(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Self {
            values: HashMap::new(),
            enclosing: Some(Rc::clone(enclosing)),
        }))
    }

    pub fn define(&mut self, name: String, value: Object) {
        self.values.insert(name, value);
    }

    pub fn get(&self, name: &Token) -> Result<Object> {
        if let Some(value) = self.values.get(&name.lexeme) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(LoxError::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", name.lexeme),
            })
        }
    }

    pub fn assign(&mut self, name: &Token, value: Object) -> Result<()> {
        if self.values.contains_key(&name.lexeme) {
            self.values.insert(name.lexeme.clone(), value);
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(LoxError::Runtime {
                token: name.clone(),
                message: format!("Undefined variable '{}'.", name.lexeme),
            })
        }
    }
}

/// Walks `distance` enclosing links from `env`, returning the ancestor
/// environment the resolver determined holds the binding. Used by the
/// evaluator so that a resolved reference is an O(1) hop-count walk rather
/// than a linear scan up the chain.
pub fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
    let mut current = Rc::clone(env);
    for _ in 0..distance {
        let next = current
            .borrow()
            .enclosing
            .as_ref()
            .expect("resolver recorded a depth deeper than the environment chain")
            .clone();
        current = next;
    }
    current
}

pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, name: &Token) -> Result<Object> {
    let target = ancestor(env, distance);
    let value = target
        .borrow()
        .values
        .get(&name.lexeme)
        .cloned()
        .ok_or_else(|| LoxError::Runtime {
            token: name.clone(),
            message: format!("Undefined variable '{}'.", name.lexeme),
        })?;
    Ok(value)
}

pub fn get_at_str(env: &Rc<RefCell<Environment>>, distance: usize, name: &str) -> Option<Object> {
    let target = ancestor(env, distance);
    let value = target.borrow().values.get(name).cloned();
    value
}

pub fn assign_at(
    env: &Rc<RefCell<Environment>>,
    distance: usize,
    name: &Token,
    value: Object,
) -> Result<()> {
    let target = ancestor(env, distance);
    target.borrow_mut().values.insert(name.lexeme.clone(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn tok(lexeme: &str) -> Token {
        Token::new(TokenType::Identifier, lexeme, 1)
    }

    #[test]
    fn reads_from_enclosing_scope() {
        let globals = Environment::new();
        globals
            .borrow_mut()
            .define("x".to_string(), Object::Number(1.0));
        let inner = Environment::with_enclosing(&globals);
        let value = inner.borrow().get(&tok("x")).unwrap();
        assert!(value.equals(&Object::Number(1.0)));
    }

    #[test]
    fn assigning_to_undefined_name_errors() {
        let env = Environment::new();
        let err = env.borrow_mut().assign(&tok("missing"), Object::Nil);
        assert!(matches!(err, Err(LoxError::Runtime { .. })));
    }

    #[test]
    fn shadowing_does_not_touch_outer_scope() {
        let globals = Environment::new();
        globals
            .borrow_mut()
            .define("x".to_string(), Object::Number(1.0));
        let inner = Environment::with_enclosing(&globals);
        inner.borrow_mut().define("x".to_string(), Object::Number(2.0));
        assert!(inner
            .borrow()
            .get(&tok("x"))
            .unwrap()
            .equals(&Object::Number(2.0)));
        assert!(globals
            .borrow()
            .get(&tok("x"))
            .unwrap()
            .equals(&Object::Number(1.0)));
    }
}
