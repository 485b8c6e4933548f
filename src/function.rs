use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::environment::{self, Environment};
use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::object::Object;
use crate::syntax::FunctionDecl;

/// `Callable = UserFunction | Builtin`, as a single enum rather than dynamic
/// dispatch over a trait object — class constructors are handled directly
/// through `Object::Class` at the call site (see `interpreter::eval_call`),
/// so they don't need a variant here.
#[derive(Clone)]
pub enum Function {
    /// Exposed to user code but implemented in the host language. `clock`
    /// is the only one the language spec requires.
    Native {
        name: &'static str,
        arity: usize,
        body: fn(&[Object]) -> Object,
    },
    User {
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    },
}

impl Function {
    pub fn new_user(
        declaration: Rc<FunctionDecl>,
        closure: Rc<RefCell<Environment>>,
        is_initializer: bool,
    ) -> Self {
        Function::User {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Native { arity, .. } => *arity,
            Function::User { declaration, .. } => declaration.params.len(),
        }
    }

    pub fn call(&self, interpreter: &mut Interpreter, arguments: &[Object]) -> Result<Object> {
        match self {
            Function::Native { body, .. } => Ok(body(arguments)),
            Function::User {
                declaration,
                closure,
                is_initializer,
            } => {
                // Each call gets its own fresh environment parented on the
                // closure. Without this, recursive or re-entrant calls to the
                // same function would trample each other's locals.
                let call_env = Environment::with_enclosing(closure);
                for (param, argument) in declaration.params.iter().zip(arguments.iter()) {
                    call_env
                        .borrow_mut()
                        .define(param.lexeme.clone(), argument.clone());
                }

                let result = interpreter.execute_block(&declaration.body, call_env);

                if *is_initializer {
                    // An initializer always yields the instance it was bound
                    // to, regardless of what (if anything) it returned — but
                    // a runtime error in its body still has to propagate
                    // rather than be swallowed in favor of `this`.
                    return match result {
                        Err(LoxError::Return { .. }) | Ok(()) => {
                            Ok(environment::get_at_str(closure, 0, "this")
                                .expect("bound initializer closure always has 'this'"))
                        }
                        Err(other) => Err(other),
                    };
                }

                match result {
                    Err(LoxError::Return { value }) => Ok(value),
                    Err(other) => Err(other),
                    Ok(()) => Ok(Object::Nil),
                }
            }
        }
    }

    /// Produces a fresh closure-within-a-closure with `this` bound to
    /// `instance`. That new environment becomes the parent of the method
    /// body's own call environment the next time it's invoked.
    pub fn bind(&self, instance: Object) -> Self {
        match self {
            Function::Native { .. } => unreachable!("native functions are never methods"),
            Function::User {
                declaration,
                closure,
                is_initializer,
            } => {
                let env = Environment::with_enclosing(closure);
                env.borrow_mut().define("this".to_string(), instance);
                Function::User {
                    declaration: Rc::clone(declaration),
                    closure: env,
                    is_initializer: *is_initializer,
                }
            }
        }
    }

}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Native { name, .. } => write!(f, "<native fn {name}>"),
            Function::User { declaration, .. } => write!(f, "<fn {}>", declaration.name.lexeme),
        }
    }
}

pub fn clock() -> Function {
    Function::Native {
        name: "clock",
        arity: 0,
        body: |_args| {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("system clock before the epoch");
            Object::Number(now.as_secs_f64())
        },
    }
}
