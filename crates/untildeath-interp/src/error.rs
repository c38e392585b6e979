//! Runtime-level error and control-flow types.
//!
//! `AthError` covers the two catchable kinds (`Runtime`, `User`); they are
//! the only variants `ATTEMPT { } SALVAGE err { }` can intercept. The
//! `Return` control-flow signal used by `BEQUEATH` is deliberately kept out
//! of this enum (see `ControlFlow`) so it can never be caught by accident.

use std::fmt;
use untildeath_core::ast::Pos;
use untildeath_core::value::Value;

/// Display is implemented by hand rather than via `thiserror`'s `#[error(...)]`
/// shorthand, since the rendering depends on whether `pos` is present
/// (`Runtime` carries an optional one) and thiserror's format string can't
/// branch on that — matches the `[line L, col C] message` shape `LexError`/
/// `ParseError` produce for the same diagnostic stream.
#[derive(Debug, Clone)]
pub enum AthError {
    Runtime { message: String, pos: Option<Pos> },
    User { message: String, pos: Pos },
}

impl fmt::Display for AthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AthError::Runtime { message, pos: Some(pos) } => {
                write!(f, "[line {}, col {}] {message}", pos.line, pos.column)
            }
            AthError::Runtime { message, pos: None } => write!(f, "{message}"),
            AthError::User { message, pos } => {
                write!(f, "[line {}, col {}] {message}", pos.line, pos.column)
            }
        }
    }
}

impl std::error::Error for AthError {}

impl AthError {
    pub fn runtime(message: impl Into<String>) -> AthError {
        AthError::Runtime {
            message: message.into(),
            pos: None,
        }
    }

    pub fn runtime_at(message: impl Into<String>, pos: Pos) -> AthError {
        AthError::Runtime {
            message: message.into(),
            pos: Some(pos),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AthError::Runtime { message, .. } => message,
            AthError::User { message, .. } => message,
        }
    }
}

/// Non-`Error` control-flow signals. These unwind the evaluator's call
/// stack through `?`/`Result` plumbing via `EvalFlow` (see `eval.rs`) but
/// are never surfaced to `ATTEMPT/SALVAGE`.
#[derive(Debug, Clone)]
pub enum ControlFlow {
    /// `BEQUEATH value;` — unwinds only to the enclosing rite call.
    Return(Value),
    /// The step-hook observer requested termination.
    DebuggerQuit,
}

/// Everything that can interrupt evaluation: a catchable error or a
/// control-flow signal.
#[derive(Debug, Clone)]
pub enum EvalSignal {
    Error(AthError),
    Control(ControlFlow),
}

impl From<AthError> for EvalSignal {
    fn from(e: AthError) -> Self {
        EvalSignal::Error(e)
    }
}

impl From<ControlFlow> for EvalSignal {
    fn from(c: ControlFlow) -> Self {
        EvalSignal::Control(c)
    }
}

pub type EvalResult<T> = Result<T, EvalSignal>;
