//! Blocking stdin-driven step hook for `--step`. Prints the current
//! statement and entity table, then waits for `s`/`r`/`q` on stdin before
//! letting evaluation continue.

use std::io::{self, Write};

use untildeath_interp::{StepContext, StepDirective, StepHook};

pub struct StdinStepHook {}

impl StdinStepHook {
    pub fn new() -> Self {
        StdinStepHook {}
    }
}

impl StepHook for StdinStepHook {
    fn on_step(&self, ctx: &StepContext<'_>) -> StepDirective {
        eprintln!(
            "[line {}, col {}] {} (branch: {})",
            ctx.pos.line, ctx.pos.column, ctx.node_kind, ctx.branch
        );
        if !ctx.entities.is_empty() {
            let listing: Vec<String> = ctx
                .entities
                .iter()
                .map(|e| format!("{}={}", e.name, if e.alive { "ALIVE" } else { "DEAD" }))
                .collect();
            eprintln!("  entities: {}", listing.join(", "));
        }

        loop {
            print!("(s)tep, (r)un, (q)uit > ");
            let _ = io::stdout().flush();

            let mut line = String::new();
            if io::stdin().read_line(&mut line).unwrap_or(0) == 0 {
                return StepDirective::Quit;
            }

            match line.trim() {
                "s" | "" => return StepDirective::Step,
                "r" => return StepDirective::Run,
                "q" => return StepDirective::Quit,
                other => println!("unrecognized command: {other}"),
            }
        }
    }
}
