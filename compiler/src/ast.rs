// AST node types for fusion description (.fus) files.
//
// A fusion description lists the tensors of a fused kernel with their loop
// axes, the compute-at sets that fuse axes together, and `set` directives.
// Every node carries a `SimpleSpan` for error reporting in downstream phases.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

use crate::expr::BinOp;
use crate::parallel::ParallelAxis;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Span used for nodes built programmatically rather than parsed.
pub fn no_span() -> Span {
    (0..0).into()
}

// ── Root ──

/// A complete fusion description: a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// ── Statements ──

/// A top-level statement with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Set(SetStmt),
    Tensor(TensorStmt),
    Fuse(FuseStmt),
}

// ── set_stmt: 'set' IDENT '=' set_value ──

#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub name: Ident,
    pub value: SetValue,
}

/// RHS of a `set` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    Number(i64, Span),
    Ident(Ident),
}

// ── tensor_stmt: 'tensor' IDENT '{' axis_decl* '}' ──

#[derive(Debug, Clone, PartialEq)]
pub struct TensorStmt {
    pub name: Ident,
    pub axes: Vec<AxisDecl>,
}

/// Iteration kind prefix of an axis declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKindAst {
    Broadcast,
    Reduction,
}

/// axis_decl: kind? IDENT '=' expr ('@' parallel_axis)?
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDecl {
    pub kind: Option<AxisKindAst>,
    pub name: Ident,
    pub extent: Expr,
    pub parallel: Option<(ParallelAxis, Span)>,
    pub span: Span,
}

// ── fuse_stmt: 'fuse' IDENT (',' IDENT)+ ──

#[derive(Debug, Clone, PartialEq)]
pub struct FuseStmt {
    pub axes: Vec<Ident>,
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64, Span),
    /// Runtime scalar, e.g. `N`.
    Symbol(Ident),
    /// `extent(i0)`
    Extent(Ident),
    /// `blockDim.x`, `gridDim.y`, ...
    Launch(ParallelAxis, Span),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int(_, span) | Expr::Launch(_, span) => *span,
            Expr::Symbol(ident) | Expr::Extent(ident) => ident.span,
            Expr::Binary { span, .. } => *span,
        }
    }
}

// ── Common ──

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
