use crate::error::LoxError;
use crate::token::{Token, TokenType};

/// The diagnostic sink. One instance per run, threaded through the lexer,
/// parser, and resolver instead of a true global, so that embedding the
/// interpreter (e.g. from the REPL or from tests) never leaks state between
/// independent runs.
#[derive(Default)]
pub struct Diagnostics {
    pub had_error: bool,
    pub had_runtime_error: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, line: i32, message: &str) {
        self.report(line, "", message);
    }

    pub fn parser_error(&mut self, token: &Token, message: &str) {
        if token.token_type == TokenType::Eof {
            self.report(token.line, " at end", message);
        } else {
            self.report(token.line, &format!(" at '{}'", token.lexeme), message);
        }
    }

    pub fn runtime_error(&mut self, err: &LoxError) {
        if let LoxError::Runtime { token, message } = err {
            eprintln!("{message}\n[line {}]", token.line);
            self.had_runtime_error = true;
        }
    }

    fn report(&mut self, line: i32, location: &str, message: &str) {
        eprintln!("[line {line}] Error{location}: {message}");
        self.had_error = true;
    }
}
