mod class;
mod diagnostics;
mod environment;
mod error;
mod function;
mod interpreter;
mod object;
mod parser;
mod resolver;
mod scanner;
mod syntax;
mod token;

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

pub use diagnostics::Diagnostics;
pub use error::LoxError;

use interpreter::Interpreter;
use resolver::Resolver;
use scanner::Scanner;

/// Process exit codes, matching the convention the `sysexits.h`-derived
/// codes Lox's reference implementation uses: 65 for a data/usage error
/// caught statically, 70 for an internal runtime error, 74 for I/O.
pub mod exit_code {
    pub const OK: i32 = 0;
    pub const DATAERR: i32 = 65;
    pub const SOFTWARE: i32 = 70;
    pub const IOERR: i32 = 74;
}

/// Drives the pipeline end to end: scan, parse, resolve, evaluate. One
/// `Lox` instance owns one `Interpreter` (and so one `globals`
/// environment) for the lifetime of the process — a REPL session's
/// `var`/`fun`/`class` declarations persist across lines because of this,
/// the same as running a file straight through.
pub struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
        }
    }

    /// Construct a `Lox` whose `print` output is captured into an
    /// in-memory buffer instead of going to stdout. Used by tests that want
    /// to assert on exactly what a program printed.
    pub fn with_capture() -> (Self, Rc<RefCell<Vec<String>>>) {
        let (interpreter, buffer) = Interpreter::with_capture();
        (Self { interpreter }, buffer)
    }

    pub fn run_file(&mut self, path: &str) -> Result<i32, LoxError> {
        let source = fs::read_to_string(path)?;
        Ok(self.run(&source))
    }

    /// Runs one REPL-style input, in-process history maintained by the
    /// caller. `had_error` is scoped to this single call, as specified:
    /// an error on one line never poisons the next.
    #[tracing::instrument(skip(self, source), level = "debug")]
    pub fn run(&mut self, source: &str) -> i32 {
        let mut diagnostics = Diagnostics::new();

        let tokens = Scanner::new(source, &mut diagnostics).scan_tokens();
        let statements = parser::parse(&tokens, &mut diagnostics);

        if diagnostics.had_error {
            return exit_code::DATAERR;
        }

        // The side-table is keyed by this call's Token addresses only;
        // drop whatever the previous `run` left behind before resolving
        // this one, or a freed token's address could be reused and collide
        // with a stale depth entry.
        self.interpreter.reset_locals();

        // The resolver pokes its findings directly into the interpreter's
        // side-table as it walks, rather than handing back a separate
        // table for the interpreter to consult.
        Resolver::new(&mut self.interpreter, &mut diagnostics).resolve_stmts(&statements);

        if diagnostics.had_error {
            return exit_code::DATAERR;
        }

        self.interpreter.interpret(&statements, &mut diagnostics);

        if diagnostics.had_runtime_error {
            exit_code::SOFTWARE
        } else {
            exit_code::OK
        }
    }
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}
