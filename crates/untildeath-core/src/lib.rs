pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod value;

pub use ast::{Program, Stmt};
pub use error::SyntaxError;
pub use parser::parse;
pub use scope::{Scope, ScopeRef};
pub use value::Value;
