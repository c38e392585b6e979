//! The step-hook contract: an external observer invoked before each
//! statement. The debugger/TUI that would drive this is out of scope here;
//! this module only defines the interface those tools would consume.

use untildeath_core::ast::Pos;
use untildeath_core::scope::ScopeRef;

/// A read-only snapshot of one entity, as exposed to the step hook. Exposing
/// the live `Rc<Entity>` would let an observer call `die()` and perturb
/// evaluation semantics, which the hook contract forbids.
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    pub name: String,
    pub alive: bool,
}

pub struct StepContext<'a> {
    pub node_kind: &'static str,
    pub pos: Pos,
    pub scope: &'a ScopeRef,
    pub branch: String,
    pub entities: Vec<EntitySnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirective {
    /// Execute exactly the next statement, then call the hook again.
    Step,
    /// Stop stepping; run to completion without further hook calls.
    Run,
    /// Abort evaluation (`ControlFlow::DebuggerQuit`).
    Quit,
}

pub trait StepHook {
    fn on_step(&self, ctx: &StepContext<'_>) -> StepDirective;
}
