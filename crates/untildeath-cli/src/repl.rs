//! Line-buffered REPL: accumulates input until braces/parens/brackets
//! balance, then parses and runs the accumulated statements against a
//! single persistent interpreter so `BIRTH`/`RITE`/imports from one line
//! are visible on the next.

use std::io::{self, BufRead, Write};
use std::rc::Rc;

use untildeath_interp::{EvalSignal, Interpreter};

use crate::step::StdinStepHook;

pub async fn run_repl(step: bool) -> u8 {
    let interpreter = Interpreter::new(None, Vec::new());
    interpreter.ensure_this();
    if step {
        interpreter.set_step_hook(Rc::new(StdinStepHook::new()));
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut buffer = String::new();

    loop {
        print!("{}", if buffer.is_empty() { ">>> " } else { "... " });
        let _ = io::stdout().flush();

        let Some(line) = lines.next() else {
            println!();
            return 0;
        };
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                return 1;
            }
        };

        buffer.push_str(&line);
        buffer.push('\n');

        if !balanced(&buffer) {
            continue;
        }
        if buffer.trim().is_empty() {
            buffer.clear();
            continue;
        }

        let program = match untildeath_core::parse(&buffer) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{e}");
                buffer.clear();
                continue;
            }
        };
        buffer.clear();

        for stmt in &program.statements {
            if let Err(signal) = interpreter.execute(stmt).await {
                match signal {
                    EvalSignal::Error(e) => eprintln!("{e}"),
                    EvalSignal::Control(untildeath_interp::ControlFlow::DebuggerQuit) => return 130,
                    EvalSignal::Control(_) => {}
                }
                break;
            }
        }
    }
}

/// True once every brace/paren/bracket opened in `source` has been closed.
/// Ignores nesting inside string literals so quoted braces don't throw off
/// the count.
fn balanced(source: &str) -> bool {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        if in_string {
            if c == '\\' {
                chars.next();
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '(' | '[' => depth += 1,
            '}' | ')' | ']' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0
}
