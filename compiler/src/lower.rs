// lower.rs — Fusion lowering: AST → Fusion + compute-at map + options
//
// Builds the fused computation from the parsed description. Tensors and axes
// are created in declaration order, so AxisIds follow source order. `fuse`
// statements are resolved after all tensors exist, so a fuse may name axes
// declared further down the file; the compute-at pass merges them. `set`
// directives become dimension-map options.
//
// Preconditions: program parsed without errors.
// Postconditions: every fuse group names only declared axes;
//   every `extent(x)` in a size expression refers to an axis declared earlier.
// Failure modes: duplicate names, unknown axis references and invalid `set`
//   values produce error diagnostics; unknown `set` names produce warnings.
//   Lowering continues past errors to report as many as possible.
// Side effects: none.

use std::collections::HashMap;

use crate::ast::{AxisDecl, AxisKindAst, Expr, Program, SetValue, Span, StatementKind, TensorStmt};
use crate::compute_at::FuseGroup;
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};
use crate::expr::SizeExpr;
use crate::fusion::{Fusion, IterKind};
use crate::id::{AxisId, TensorId};
use crate::parallel_dims::{DimMapOptions, RepresentativePolicy};
use crate::program_query::{set_statements, KNOWN_SET_DIRECTIVES};

// ── Output types ────────────────────────────────────────────────────────────

/// Result of fusion lowering.
#[derive(Debug)]
pub struct LowerResult {
    pub fusion: Fusion,
    /// Resolved `fuse` statements, in source order.
    pub fuse_groups: Vec<FuseGroup>,
    /// Options taken from `set` directives.
    pub options: DimMapOptions,
    pub diagnostics: Vec<Diagnostic>,
}

impl LowerResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagLevel::Error)
    }
}

// ── Public entry point ──────────────────────────────────────────────────────

pub fn lower(program: &Program) -> LowerResult {
    let mut ctx = LowerCtx::default();
    ctx.lower_options(program);
    for stmt in &program.statements {
        if let StatementKind::Tensor(tensor) = &stmt.kind {
            ctx.lower_tensor(tensor, stmt.span);
        }
    }
    for stmt in &program.statements {
        if let StatementKind::Fuse(fuse) = &stmt.kind {
            let mut axes = Vec::with_capacity(fuse.axes.len());
            for ident in &fuse.axes {
                match ctx.axes.get(&ident.name) {
                    Some(&id) => axes.push(id),
                    None => ctx.error(
                        codes::E0103,
                        ident.span,
                        format!("unknown axis '{}' in fuse", ident.name),
                    ),
                }
            }
            ctx.fuse_groups.push(FuseGroup {
                axes,
                span: stmt.span,
            });
        }
    }
    LowerResult {
        fusion: ctx.fusion,
        fuse_groups: ctx.fuse_groups,
        options: ctx.options,
        diagnostics: ctx.diagnostics,
    }
}

// ── Lowering context ────────────────────────────────────────────────────────

#[derive(Default)]
struct LowerCtx {
    fusion: Fusion,
    fuse_groups: Vec<FuseGroup>,
    options: DimMapOptions,
    diagnostics: Vec<Diagnostic>,
    axes: HashMap<String, AxisId>,
    axis_spans: HashMap<AxisId, Span>,
    tensor_spans: HashMap<String, Span>,
}

impl LowerCtx {
    fn error(&mut self, code: DiagCode, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::new(DiagLevel::Error, span, message).with_code(code));
    }

    fn lower_options(&mut self, program: &Program) {
        for (set, _) in set_statements(program) {
            let name = set.name.name.as_str();
            if !KNOWN_SET_DIRECTIVES.contains(&name) {
                self.diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        set.name.span,
                        format!("unknown set directive '{}'", name),
                    )
                    .with_code(codes::W0101)
                    .with_hint(format!("known directives: {}", KNOWN_SET_DIRECTIVES.join(", "))),
                );
                continue;
            }
            // Only `representative` today.
            match &set.value {
                SetValue::Ident(ident) => match ident.name.parse::<RepresentativePolicy>() {
                    Ok(policy) => self.options.representative = policy,
                    Err(msg) => self.error(codes::E0105, ident.span, msg),
                },
                SetValue::Number(n, value_span) => self.error(
                    codes::E0105,
                    *value_span,
                    format!("'{}' expects a policy name, found number {}", name, n),
                ),
            }
        }
    }

    fn lower_tensor(&mut self, stmt: &TensorStmt, span: Span) {
        if let Some(&first) = self.tensor_spans.get(&stmt.name.name) {
            self.diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    stmt.name.span,
                    format!("duplicate tensor '{}'", stmt.name.name),
                )
                .with_code(codes::E0104)
                .with_related(first, "first declared here"),
            );
            return;
        }
        self.tensor_spans.insert(stmt.name.name.clone(), stmt.name.span);

        let tensor = self.fusion.add_tensor(stmt.name.name.clone());
        self.fusion.set_tensor_span(tensor, span);
        for decl in &stmt.axes {
            self.lower_axis(tensor, decl);
        }
    }

    fn lower_axis(&mut self, tensor: TensorId, decl: &AxisDecl) {
        if let Some(&prev) = self.axes.get(&decl.name.name) {
            let mut diag = Diagnostic::new(
                DiagLevel::Error,
                decl.name.span,
                format!("duplicate axis '{}'", decl.name.name),
            )
            .with_code(codes::E0101)
            .with_hint("axis names must be unique across the fusion");
            if let Some(&first) = self.axis_spans.get(&prev) {
                diag = diag.with_related(first, "first declared here");
            }
            self.diagnostics.push(diag);
            return;
        }

        let Some(extent) = self.lower_expr(&decl.extent) else {
            return;
        };
        let id = self.fusion.add_axis(
            tensor,
            decl.name.name.clone(),
            extent,
            decl.parallel.map(|(pt, _)| pt),
        );
        self.fusion.set_axis_span(id, decl.span);
        match decl.kind {
            Some(AxisKindAst::Broadcast) => self.fusion.set_kind(id, IterKind::Broadcast),
            Some(AxisKindAst::Reduction) => self.fusion.set_kind(id, IterKind::Reduction),
            None => {}
        }
        self.axes.insert(decl.name.name.clone(), id);
        self.axis_spans.insert(id, decl.span);
    }

    /// Returns `None` (after reporting) if the expression names an unknown axis.
    fn lower_expr(&mut self, expr: &Expr) -> Option<SizeExpr> {
        match expr {
            Expr::Int(n, _) => Some(SizeExpr::Const(*n)),
            Expr::Symbol(ident) => Some(SizeExpr::symbol(ident.name.clone())),
            Expr::Launch(pt, _) => Some(SizeExpr::Launch(*pt)),
            Expr::Extent(ident) => match self.axes.get(&ident.name) {
                Some(&id) => self.fusion.extent_ref(id),
                None => {
                    self.error(
                        codes::E0102,
                        ident.span,
                        format!("unknown axis '{}' in extent()", ident.name),
                    );
                    None
                }
            },
            Expr::Binary { op, lhs, rhs, .. } => {
                // Lower both sides so every unknown reference is reported.
                let lhs = self.lower_expr(lhs);
                let rhs = self.lower_expr(rhs);
                Some(SizeExpr::binary(*op, lhs?, rhs?))
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinOp;
    use crate::parallel::ParallelAxis;
    use crate::parser::parse;

    fn lower_src(src: &str) -> LowerResult {
        let parsed = parse(src);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        lower(&parsed.program.unwrap())
    }

    fn lower_ok(src: &str) -> LowerResult {
        let result = lower_src(src);
        assert!(
            result.diagnostics.is_empty(),
            "unexpected diagnostics: {:#?}",
            result.diagnostics
        );
        result
    }

    fn codes_of(result: &LowerResult) -> Vec<&'static str> {
        result
            .diagnostics
            .iter()
            .filter_map(|d| d.code.map(|c| c.0))
            .collect()
    }

    #[test]
    fn axes_follow_declaration_order() {
        let r = lower_ok("tensor T0 {\n  i0 = 128 @ TIDx\n  i1 = N\n}\ntensor T1 {\n  i2 = 4\n}\n");
        assert_eq!(r.fusion.axis_count(), 3);
        assert_eq!(r.fusion.find_axis("i2"), Some(AxisId(2)));
        let i0 = r.fusion.axis(AxisId(0)).unwrap();
        assert_eq!(i0.parallel, Some(ParallelAxis::TIDx));
        assert_eq!(i0.extent, SizeExpr::Const(128));
        assert_eq!(r.fusion.axis(AxisId(1)).unwrap().extent, SizeExpr::symbol("N"));
    }

    #[test]
    fn kinds_are_lowered() {
        let r = lower_ok("tensor T0 {\n  bcast b0 = 1\n  reduce r0 = K\n}\n");
        assert_eq!(r.fusion.axis(AxisId(0)).unwrap().kind, IterKind::Broadcast);
        assert_eq!(r.fusion.axis(AxisId(1)).unwrap().kind, IterKind::Reduction);
    }

    #[test]
    fn extent_refers_to_axis_id() {
        let r = lower_ok("tensor T0 {\n  i0 = N\n  i1 = ceildiv(extent(i0), 4)\n}\n");
        let i1 = r.fusion.axis(AxisId(1)).unwrap();
        assert_eq!(
            i1.extent,
            SizeExpr::binary(
                BinOp::CeilDiv,
                SizeExpr::extent(AxisId(0), "i0"),
                SizeExpr::Const(4)
            )
        );
    }

    #[test]
    fn fuse_resolves_axis_ids() {
        let r = lower_ok(
            "tensor T0 {\n  i0 = 4\n}\ntensor T1 {\n  i1 = 4\n}\ntensor T2 {\n  i2 = 4\n}\nfuse i2, i1\n",
        );
        assert_eq!(r.fuse_groups.len(), 1);
        assert_eq!(r.fuse_groups[0].axes, vec![AxisId(2), AxisId(1)]);
    }

    #[test]
    fn fuse_before_declaration_is_allowed() {
        let r = lower_ok("fuse a, b\ntensor T0 {\n  a = 4\n}\ntensor T1 {\n  b = 4\n}\n");
        assert_eq!(r.fuse_groups[0].axes, vec![AxisId(0), AxisId(1)]);
    }

    #[test]
    fn duplicate_axis_reported() {
        let r = lower_src("tensor T0 {\n  i0 = 4\n}\ntensor T1 {\n  i0 = 8\n}\n");
        assert!(r.has_errors());
        assert_eq!(codes_of(&r), vec!["E0101"]);
        assert_eq!(r.diagnostics[0].related_spans.len(), 1);
        assert_eq!(r.fusion.axis_count(), 1);
    }

    #[test]
    fn duplicate_tensor_reported() {
        let r = lower_src("tensor T0 {\n  i0 = 4\n}\ntensor T0 {\n  i1 = 8\n}\n");
        assert_eq!(codes_of(&r), vec!["E0104"]);
        assert_eq!(r.fusion.tensors().len(), 1);
    }

    #[test]
    fn unknown_extent_reference_reported() {
        let r = lower_src("tensor T0 {\n  i0 = extent(i9) + extent(i8)\n}\n");
        assert_eq!(codes_of(&r), vec!["E0102", "E0102"]);
        assert_eq!(r.fusion.axis_count(), 0);
    }

    #[test]
    fn forward_extent_reference_reported() {
        let r = lower_src("tensor T0 {\n  i0 = extent(i1)\n  i1 = 4\n}\n");
        assert_eq!(codes_of(&r), vec!["E0102"]);
    }

    #[test]
    fn unknown_fuse_axis_reported() {
        let r = lower_src("tensor T0 {\n  i0 = 4\n}\nfuse i0, nope\n");
        assert_eq!(codes_of(&r), vec!["E0103"]);
        assert_eq!(r.fuse_groups[0].axes, vec![AxisId(0)]);
    }

    #[test]
    fn representative_directive() {
        let r = lower_ok("set representative = launch\n");
        assert_eq!(r.options.representative, RepresentativePolicy::LaunchParam);
        let r = lower_ok("");
        assert_eq!(r.options.representative, RepresentativePolicy::FirstCollected);
    }

    #[test]
    fn invalid_representative_value() {
        let r = lower_src("set representative = largest\n");
        assert_eq!(codes_of(&r), vec!["E0105"]);
        let r = lower_src("set representative = 3\n");
        assert_eq!(codes_of(&r), vec!["E0105"]);
    }

    #[test]
    fn unknown_directive_is_warning() {
        let r = lower_src("set unroll = 4\n");
        assert_eq!(codes_of(&r), vec!["W0101"]);
        assert!(!r.has_errors());
    }
}
