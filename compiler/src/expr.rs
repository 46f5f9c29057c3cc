// expr.rs — Size expressions and symbolic equality
//
// A size expression is either an integer literal or a symbolic reference:
// the extent of a loop axis, a launch-configuration placeholder, a runtime
// scalar, or arithmetic over those. Expressions are immutable values compared
// structurally, never by identity.
//
// Preconditions: none.
// Postconditions: `equal_dim` never reports two expressions equal when they
//   can differ at runtime (false negatives allowed, false positives not).
// Failure modes: none; constant folding that overflows or divides by zero
//   yields "not constant".
// Side effects: none.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::id::AxisId;
use crate::parallel::ParallelAxis;

// ── Axis reference ──────────────────────────────────────────────────────────

/// Reference to a loop axis inside an expression. Identity is the `AxisId`;
/// the name is carried for display only.
#[derive(Debug, Clone, Serialize)]
pub struct AxisRef {
    pub id: AxisId,
    pub name: String,
}

impl AxisRef {
    pub fn new(id: AxisId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl PartialEq for AxisRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AxisRef {}

impl Hash for AxisRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

// ── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    CeilDiv,
}

impl BinOp {
    pub fn is_commutative(self) -> bool {
        matches!(self, BinOp::Add | BinOp::Mul)
    }

    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::CeilDiv => "ceildiv",
        }
    }

    fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            BinOp::Add => lhs.checked_add(rhs),
            BinOp::Sub => lhs.checked_sub(rhs),
            BinOp::Mul => lhs.checked_mul(rhs),
            BinOp::Div => lhs.checked_div(rhs),
            BinOp::CeilDiv => {
                if lhs < 0 || rhs <= 0 {
                    return None;
                }
                lhs.checked_add(rhs - 1)?.checked_div(rhs)
            }
        }
    }
}

// ── Size expression ─────────────────────────────────────────────────────────

/// Size of a loop axis or of a launch-grid dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SizeExpr {
    /// Integer literal.
    Const(i64),
    /// Runtime scalar input (e.g. a tensor size passed at launch).
    Symbol(String),
    /// Extent of another loop axis.
    Extent(AxisRef),
    /// Launch-configuration placeholder (`blockDim.x`, `gridDim.y`, ...).
    Launch(ParallelAxis),
    /// Derived arithmetic.
    Binary {
        op: BinOp,
        lhs: Box<SizeExpr>,
        rhs: Box<SizeExpr>,
    },
}

impl SizeExpr {
    pub fn symbol(name: impl Into<String>) -> Self {
        SizeExpr::Symbol(name.into())
    }

    pub fn extent(id: AxisId, name: impl Into<String>) -> Self {
        SizeExpr::Extent(AxisRef::new(id, name))
    }

    pub fn binary(op: BinOp, lhs: SizeExpr, rhs: SizeExpr) -> Self {
        SizeExpr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// The literal value, if this expression is syntactically a literal.
    pub fn as_literal(&self) -> Option<i64> {
        match self {
            SizeExpr::Const(n) => Some(*n),
            _ => None,
        }
    }

    /// Fold the expression to an integer if every leaf is a literal.
    pub fn evaluate(&self) -> Option<i64> {
        match self {
            SizeExpr::Const(n) => Some(*n),
            SizeExpr::Binary { op, lhs, rhs } => op.apply(lhs.evaluate()?, rhs.evaluate()?),
            SizeExpr::Symbol(_) | SizeExpr::Extent(_) | SizeExpr::Launch(_) => None,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeExpr::Binary { op, .. } if *op != BinOp::CeilDiv => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

impl fmt::Display for SizeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeExpr::Const(n) => write!(f, "{}", n),
            SizeExpr::Symbol(name) => write!(f, "{}", name),
            SizeExpr::Extent(axis) => write!(f, "extent({})", axis.name),
            SizeExpr::Launch(pt) => write!(f, "{}", pt.launch_dim_name()),
            SizeExpr::Binary {
                op: BinOp::CeilDiv,
                lhs,
                rhs,
            } => write!(f, "ceildiv({}, {})", lhs, rhs),
            SizeExpr::Binary { op, lhs, rhs } => {
                lhs.fmt_operand(f)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_operand(f)
            }
        }
    }
}

// ── Symbolic equality ───────────────────────────────────────────────────────

/// Conservatively decide whether two size expressions are equal at runtime.
///
/// Constant-foldable expressions compare by value. Otherwise expressions must
/// be structurally identical: same axis extent, same runtime scalar, same
/// launch placeholder, or the same operator over pairwise-equal operands
/// (either operand order for `+` and `*`). Anything else is reported unequal.
pub fn equal_dim(a: &SizeExpr, b: &SizeExpr) -> bool {
    equal_dim_by(a, b, &|id| id)
}

/// `equal_dim` with axis extents compared through `canonical`, so
/// `extent(a)` equals `extent(b)` whenever both axes map to the same
/// concrete domain.
pub fn equal_dim_by(a: &SizeExpr, b: &SizeExpr, canonical: &impl Fn(AxisId) -> AxisId) -> bool {
    if let (Some(x), Some(y)) = (a.evaluate(), b.evaluate()) {
        return x == y;
    }
    match (a, b) {
        (SizeExpr::Symbol(x), SizeExpr::Symbol(y)) => x == y,
        (SizeExpr::Extent(x), SizeExpr::Extent(y)) => canonical(x.id) == canonical(y.id),
        (SizeExpr::Launch(x), SizeExpr::Launch(y)) => x == y,
        (
            SizeExpr::Binary {
                op: op1,
                lhs: l1,
                rhs: r1,
            },
            SizeExpr::Binary {
                op: op2,
                lhs: l2,
                rhs: r2,
            },
        ) if op1 == op2 => {
            (equal_dim_by(l1, l2, canonical) && equal_dim_by(r1, r2, canonical))
                || (op1.is_commutative()
                    && equal_dim_by(l1, r2, canonical)
                    && equal_dim_by(r1, l2, canonical))
        }
        _ => false,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
