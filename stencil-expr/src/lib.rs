//! Restricted expression language used by stencil templates.
//!
//! Directive values, attribute holes, handler bodies and script blocks are
//! parsed into a small AST and interpreted against a JSON scope. Calls only
//! reach functions registered in a [`Functions`] table.

pub mod ast;
pub mod builtins;
pub mod eval;
pub mod parser;
pub mod value;

pub use ast::{Expr, ForClause, ForKind, Interpolated, Program, Segment, Stmt};
pub use builtins::{Functions, NativeFn};
pub use eval::{Env, EvalError, Local, Locals, Origin, SCOPE_NAME};
pub use parser::{ParseError, parse_expression, parse_for_clause, parse_interpolated, parse_program};
pub use value::{to_display, truthy, type_name};

/// Parse and evaluate `src` against `scope` in one go.
pub fn evaluate(
    src: &str,
    scope: &mut serde_json::Value,
    functions: &Functions,
) -> Result<serde_json::Value, Error> {
    let expr = parse_expression(src)?;
    Ok(Env::new(scope, functions).eval(&expr)?)
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}
