// compute_at.rs — Compute-at equivalence relation over loop axes
//
// Loop axes fused into one physical loop form an equivalence class; the
// class representative is the concrete domain. The dimension pass depends
// only on the `ConcreteDomains` query, so any relation (including a test
// stub) can be injected. `ComputeAtMap` is the union-find implementation
// built from `fuse` statements by `build_compute_at`.
//
// Preconditions: every axis passed to `union` was registered.
// Postconditions: the representative of a set is its lowest (earliest-declared)
//   non-broadcast AxisId, or its lowest AxisId when every member is a broadcast.
// Failure modes: queries for unregistered axes return `None`. Fusing axes
//   bound to different parallel axes is reported as a warning (W0201).
// Side effects: none.

use std::collections::BTreeMap;

use crate::ast::Span;
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::fusion::{Fusion, IterKind};
use crate::id::AxisId;

/// Query contract of the compute-at relation.
pub trait ConcreteDomains {
    /// Canonical representative of `axis`, or `None` if the relation does not
    /// know the axis.
    fn concrete_domain(&self, axis: AxisId) -> Option<AxisId>;
}

impl<F> ConcreteDomains for F
where
    F: Fn(AxisId) -> Option<AxisId>,
{
    fn concrete_domain(&self, axis: AxisId) -> Option<AxisId> {
        self(axis)
    }
}

/// Union-find compute-at map.
#[derive(Debug, Clone, Default)]
pub struct ComputeAtMap {
    parent: Vec<AxisId>,
    /// Broadcast axes lose the representative choice to any other member.
    broadcast: Vec<bool>,
}

impl ComputeAtMap {
    /// A map where every axis of `fusion` is its own concrete domain.
    pub fn identity(fusion: &Fusion) -> Self {
        Self {
            parent: (0..fusion.axis_count() as u32).map(AxisId).collect(),
            broadcast: (0..fusion.axis_count() as u32)
                .map(|i| {
                    fusion
                        .axis(AxisId(i))
                        .is_some_and(|axis| axis.kind == IterKind::Broadcast)
                })
                .collect(),
        }
    }

    /// Register axes up to and including `axis` as singleton, non-broadcast
    /// sets.
    pub fn register(&mut self, axis: AxisId) {
        while self.parent.len() <= axis.index() {
            let next = AxisId(self.parent.len() as u32);
            self.parent.push(next);
            self.broadcast.push(false);
        }
    }

    fn rank(&self, root: AxisId) -> (bool, AxisId) {
        (self.broadcast[root.index()], root)
    }

    fn find(&self, axis: AxisId) -> Option<AxisId> {
        let mut current = *self.parent.get(axis.index())?;
        loop {
            let next = self.parent[current.index()];
            if next == current {
                return Some(current);
            }
            current = next;
        }
    }

    /// Merge the sets of `a` and `b`. Returns the representative of the
    /// merged set, or `None` if either axis is unregistered.
    pub fn union(&mut self, a: AxisId, b: AxisId) -> Option<AxisId> {
        let ra = self.find(a)?;
        let rb = self.find(b)?;
        let (root, child) = if self.rank(ra) <= self.rank(rb) {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[child.index()] = root;
        // Flatten the two inputs so later queries stay short.
        self.parent[a.index()] = root;
        self.parent[b.index()] = root;
        Some(root)
    }

    /// Non-singleton sets keyed by representative, members in id order.
    pub fn sets(&self) -> BTreeMap<AxisId, Vec<AxisId>> {
        let mut sets: BTreeMap<AxisId, Vec<AxisId>> = BTreeMap::new();
        for i in 0..self.parent.len() {
            let axis = AxisId(i as u32);
            if let Some(root) = self.find(axis) {
                sets.entry(root).or_default().push(axis);
            }
        }
        sets.retain(|_, members| members.len() > 1);
        sets
    }

    /// One `fuse` line per merged set, naming the concrete domain.
    pub fn describe(&self, fusion: &Fusion) -> String {
        let name = |id: AxisId| fusion.axis(id).map_or("?", |axis| axis.name.as_str());
        let mut out = String::new();
        for (root, members) in self.sets() {
            let names: Vec<&str> = members.iter().map(|&id| name(id)).collect();
            out.push_str(&format!(
                "fuse {}  # concrete: {}\n",
                names.join(", "),
                name(root)
            ));
        }
        out
    }
}

impl ConcreteDomains for ComputeAtMap {
    fn concrete_domain(&self, axis: AxisId) -> Option<AxisId> {
        self.find(axis)
    }
}

// ── Compute-at pass ────────────────────────────────────────────────────────

/// One resolved `fuse` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseGroup {
    pub axes: Vec<AxisId>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ComputeAtResult {
    pub map: ComputeAtMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// Build the compute-at map of `fusion`: every axis starts as its own set,
/// then each group is merged in order.
pub fn build_compute_at(fusion: &Fusion, groups: &[FuseGroup]) -> ComputeAtResult {
    let mut map = ComputeAtMap::identity(fusion);
    let mut diagnostics = Vec::new();

    for group in groups {
        for pair in group.axes.windows(2) {
            map.union(pair[0], pair[1]);
        }

        let mut bound = group
            .axes
            .iter()
            .filter_map(|&id| fusion.axis(id))
            .filter_map(|axis| axis.parallel.map(|pt| (axis, pt)));
        let Some((first, first_pt)) = bound.next() else {
            continue;
        };
        for (axis, pt) in bound {
            if pt != first_pt {
                diagnostics.push(
                    Diagnostic::new(
                        DiagLevel::Warning,
                        group.span,
                        format!(
                            "fused axes '{}' ({}) and '{}' ({}) are bound to different parallel axes",
                            first.name, first_pt, axis.name, pt
                        ),
                    )
                    .with_code(codes::W0201)
                    .with_related(first.span, "first binding")
                    .with_related(axis.span, "conflicting binding"),
                );
            }
        }
    }

    ComputeAtResult { map, diagnostics }
}
