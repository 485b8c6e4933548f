use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{LoxError, Result};
use crate::function::Function;
use crate::object::Object;
use crate::token::Token;

/// The class stores behavior; the instance stores state.
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<RefCell<LoxClass>>>,
    pub methods: HashMap<String, Rc<Function>>,
}

impl LoxClass {
    /// Walks self then ancestors, so a subclass method shadows the one it
    /// overrides while `super.m` can still reach the overridden one.
    pub fn find_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }
        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.borrow().find_method(name))
    }

    pub fn arity(&self) -> usize {
        self.find_method("init")
            .map(|init| init.arity())
            .unwrap_or(0)
    }
}

pub struct LoxInstance {
    pub class: Rc<RefCell<LoxClass>>,
    fields: HashMap<String, Object>,
}

impl LoxInstance {
    pub fn new(class: &Rc<RefCell<LoxClass>>) -> Object {
        Object::Instance(Rc::new(RefCell::new(LoxInstance {
            class: Rc::clone(class),
            fields: HashMap::new(),
        })))
    }

    /// `self_obj` is the `Object::Instance` wrapper for this same instance,
    /// needed so a method found via class lookup can be bound to it.
    pub fn get(&self, name: &Token, self_obj: &Object) -> Result<Object> {
        if let Some(value) = self.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }

        if let Some(method) = self.class.borrow().find_method(&name.lexeme) {
            let bound = method.bind(self_obj.clone());
            return Ok(Object::Callable(Rc::new(bound)));
        }

        Err(LoxError::Runtime {
            token: name.clone(),
            message: format!("Undefined property '{}'.", name.lexeme),
        })
    }

    // Lox instances are loose bags of fields you can write to at will, so
    // there's no need to check whether the key already exists.
    pub fn set(&mut self, name: &Token, value: Object) {
        self.fields.insert(name.lexeme.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_class(name: &str) -> Rc<RefCell<LoxClass>> {
        Rc::new(RefCell::new(LoxClass {
            name: name.to_string(),
            superclass: None,
            methods: HashMap::new(),
        }))
    }

    #[test]
    fn find_method_walks_superclass_chain() {
        let mut base = LoxClass {
            name: "Base".to_string(),
            superclass: None,
            methods: HashMap::new(),
        };
        base.methods.insert(
            "greet".to_string(),
            Rc::new(Function::Native {
                name: "greet",
                arity: 0,
                body: |_| Object::Nil,
            }),
        );
        let base = Rc::new(RefCell::new(base));

        let child = LoxClass {
            name: "Child".to_string(),
            superclass: Some(base),
            methods: HashMap::new(),
        };

        assert!(child.find_method("greet").is_some());
        assert!(child.find_method("missing").is_none());
    }

    #[test]
    fn arity_with_no_init_is_zero() {
        let class = empty_class("Plain");
        assert_eq!(class.borrow().arity(), 0);
    }
}
