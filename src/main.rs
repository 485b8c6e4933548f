use std::process::exit;

use lox_interpreter_rs::{exit_code, Lox};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

fn main() {
    init_logging();

    let args: Vec<String> = std::env::args().collect();
    let mut lox = Lox::new();

    let code = match args.as_slice() {
        [_, script] => run_file(&mut lox, script),
        [_] => run_prompt(&mut lox),
        _ => {
            eprintln!("Usage: lox [script]");
            exit_code::IOERR
        }
    };

    exit(code);
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).init();
}

fn run_file(lox: &mut Lox, path: &str) -> i32 {
    match lox.run_file(path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            exit_code::IOERR
        }
    }
}

/// Reads lines until EOF, running each against the same interpreter so
/// declarations persist across the session, and resetting the error state
/// between lines (a typo on one line shouldn't poison the next).
fn run_prompt(lox: &mut Lox) -> i32 {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Could not start the line editor: {err}");
            return exit_code::IOERR;
        }
    };

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                lox.run(&line);
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        }
    }

    exit_code::OK
}
