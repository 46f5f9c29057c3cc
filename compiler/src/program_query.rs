// program_query.rs — Helpers for querying program-level AST data
//
// `set` directive iteration used by option lowering.

use crate::ast::*;

/// Directives understood by the compiler.
pub const KNOWN_SET_DIRECTIVES: &[&str] = &["representative"];

/// All `set` statements in source order.
pub fn set_statements(program: &Program) -> impl Iterator<Item = (&SetStmt, Span)> + '_ {
    program.statements.iter().filter_map(|stmt| match &stmt.kind {
        StatementKind::Set(set) => Some((set, stmt.span)),
        _ => None,
    })
}
