use thiserror::Error;

use crate::object::Object;
use crate::token::Token;

/// Unifies the three error categories from the language spec: a static
/// error that was already reported through the diagnostic sink (`Parse`),
/// a runtime fault that unwinds to the top level (`Runtime`), the internal
/// `return` non-local exit (`Return` — must never escape past the call
/// frame that catches it), and host I/O failure.
#[derive(Debug, Error)]
pub enum LoxError {
    /// A lex/parse/resolve error was already reported via the diagnostic
    /// sink. Carries no payload; it only signals "stop, don't evaluate".
    #[error("parse error")]
    Parse,

    #[error("{message}")]
    Runtime { token: Token, message: String },

    /// Not a real error: the unwind `return` uses to carry a value out to
    /// the enclosing function call. Caught in `Function::call`; must never
    /// reach `main`.
    #[error("unhandled return (this is a bug)")]
    Return { value: Object },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LoxError>;
