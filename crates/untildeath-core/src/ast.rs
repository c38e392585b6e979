//! AST node definitions for the !~ATH language.

use serde::{Deserialize, Serialize};

/// A literal value as it appears in source, before evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationUnit {
    Ms,
    S,
    M,
    H,
}

impl DurationUnit {
    pub fn to_ms(self, value: i64) -> i64 {
        match self {
            DurationUnit::Ms => value,
            DurationUnit::S => value * 1_000,
            DurationUnit::M => value * 60_000,
            DurationUnit::H => value * 3_600_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Duration {
    pub unit: DurationUnit,
    pub value: i64,
    pub pos: Pos,
}

/// Entity expressions appear only inside `~ATH( ... )` and `bifurcate` headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityExpr {
    Ident { name: String, pos: Pos },
    And(Box<EntityExpr>, Box<EntityExpr>),
    Or(Box<EntityExpr>, Box<EntityExpr>),
    Not(Box<EntityExpr>, Pos),
}

impl EntityExpr {
    pub fn pos(&self) -> Pos {
        match self {
            EntityExpr::Ident { pos, .. } => *pos,
            EntityExpr::And(l, _) => l.pos(),
            EntityExpr::Or(l, _) => l.pos(),
            EntityExpr::Not(_, pos) => *pos,
        }
    }
}

/// A target for a `[...].DIE()` statement: a single identifier or a nested pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DieTarget {
    Ident { name: String, pos: Pos },
    Pair {
        left: Box<DieTarget>,
        right: Box<DieTarget>,
        pos: Pos,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal { value: LiteralValue, pos: Pos },
    Identifier { name: String, pos: Pos },
    Binary {
        op: String,
        left: Box<Expr>,
        right: Box<Expr>,
        pos: Pos,
    },
    Unary {
        op: String,
        operand: Box<Expr>,
        pos: Pos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        pos: Pos,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        pos: Pos,
    },
    Member {
        object: Box<Expr>,
        member: String,
        pos: Pos,
    },
    ArrayLiteral { elements: Vec<Expr>, pos: Pos },
    MapLiteral {
        entries: Vec<(String, Expr)>,
        pos: Pos,
    },
}

impl Expr {
    pub fn pos(&self) -> Pos {
        match self {
            Expr::Literal { pos, .. }
            | Expr::Identifier { pos, .. }
            | Expr::Binary { pos, .. }
            | Expr::Unary { pos, .. }
            | Expr::Call { pos, .. }
            | Expr::Index { pos, .. }
            | Expr::Member { pos, .. }
            | Expr::ArrayLiteral { pos, .. }
            | Expr::MapLiteral { pos, .. } => *pos,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityKindLiteral {
    Timer,
    Process,
    Connection,
    Watcher,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Import {
        entity_type: EntityKindLiteral,
        name: String,
        args: Vec<Expr>,
        pos: Pos,
    },
    Bifurcate {
        entity: String,
        branch1: String,
        branch2: String,
        pos: Pos,
    },
    AthLoop {
        entity_expr: EntityExpr,
        body: Vec<Stmt>,
        execute: Vec<Stmt>,
        pos: Pos,
    },
    Die {
        target: DieTarget,
        pos: Pos,
    },
    VarDecl {
        name: String,
        value: Expr,
        pos: Pos,
    },
    ConstDecl {
        name: String,
        value: Expr,
        pos: Pos,
    },
    Assignment {
        target: Expr,
        value: Expr,
        pos: Pos,
    },
    RiteDef {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
        pos: Pos,
    },
    Conditional {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
        pos: Pos,
    },
    AttemptSalvage {
        attempt_body: Vec<Stmt>,
        error_name: String,
        salvage_body: Vec<Stmt>,
        pos: Pos,
    },
    Condemn {
        message: Expr,
        pos: Pos,
    },
    Bequeath {
        value: Option<Expr>,
        pos: Pos,
    },
    ExprStmt {
        expression: Expr,
        pos: Pos,
    },
}

impl Stmt {
    pub fn pos(&self) -> Pos {
        match self {
            Stmt::Import { pos, .. }
            | Stmt::Bifurcate { pos, .. }
            | Stmt::AthLoop { pos, .. }
            | Stmt::Die { pos, .. }
            | Stmt::VarDecl { pos, .. }
            | Stmt::ConstDecl { pos, .. }
            | Stmt::Assignment { pos, .. }
            | Stmt::RiteDef { pos, .. }
            | Stmt::Conditional { pos, .. }
            | Stmt::AttemptSalvage { pos, .. }
            | Stmt::Condemn { pos, .. }
            | Stmt::Bequeath { pos, .. }
            | Stmt::ExprStmt { pos, .. } => *pos,
        }
    }

    /// Node-kind tag used by the external step hook; matches the `~ATH` family
    /// name of each statement form so an observer can render it without
    /// reaching into the AST.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Import { .. } => "Import",
            Stmt::Bifurcate { .. } => "Bifurcate",
            Stmt::AthLoop { .. } => "AthLoop",
            Stmt::Die { .. } => "Die",
            Stmt::VarDecl { .. } => "VarDecl",
            Stmt::ConstDecl { .. } => "ConstDecl",
            Stmt::Assignment { .. } => "Assignment",
            Stmt::RiteDef { .. } => "RiteDef",
            Stmt::Conditional { .. } => "Conditional",
            Stmt::AttemptSalvage { .. } => "AttemptSalvage",
            Stmt::Condemn { .. } => "Condemn",
            Stmt::Bequeath { .. } => "Bequeath",
            Stmt::ExprStmt { .. } => "ExprStmt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
