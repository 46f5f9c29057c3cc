// pass.rs — Pass descriptor module: metadata, dependency resolution, artifact IDs
//
// Declares the compiler's 3 semantic passes (parse is outside the runner),
// their dependency edges, and the artifacts they produce. Used by the pipeline
// runner to compute minimal pass subsets for each --emit target.

use std::collections::HashSet;

// ── Pass and Artifact identifiers ──────────────────────────────────────────

/// Identifies each compiler pass (parse excluded, it runs before the runner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    BuildFusion,
    ComputeAt,
    ParallelDims,
}

/// Machine-readable artifact identifiers. Each maps to a concrete type
/// in the compilation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactId {
    Fusion,     // Fusion
    FuseGroups, // Vec<FuseGroup>
    Options,    // DimMapOptions
    ComputeAt,  // ComputeAtMap
    DimMap,     // ParallelDimensionMap
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a compiler pass.
pub struct PassDescriptor {
    /// Human-readable name for diagnostics/verbose output.
    pub name: &'static str,
    /// Pass dependencies (other passes whose outputs this pass consumes).
    pub inputs: &'static [PassId],
    /// Artifacts this pass produces.
    pub outputs: &'static [ArtifactId],
    /// What invalidates this pass's output.
    pub invalidation_key: &'static str,
    /// Pre/post conditions (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::BuildFusion => PassDescriptor {
            name: "build_fusion",
            inputs: &[],
            outputs: &[ArtifactId::Fusion, ArtifactId::FuseGroups, ArtifactId::Options],
            invalidation_key: "source",
            invariants: "axis and tensor names unique, extent() references resolved",
        },
        PassId::ComputeAt => PassDescriptor {
            name: "compute_at",
            inputs: &[PassId::BuildFusion],
            outputs: &[ArtifactId::ComputeAt],
            invalidation_key: "fusion + fuse groups",
            invariants: "every fusion axis has a concrete domain",
        },
        PassId::ParallelDims => PassDescriptor {
            name: "parallel_dims",
            inputs: &[PassId::BuildFusion, PassId::ComputeAt],
            outputs: &[ArtifactId::DimMap],
            invalidation_key: "fusion + compute_at + options",
            invariants: "exact axes have dimensions, constants consistent per domain",
        },
    }
}

// ── Dependency resolution ──────────────────────────────────────────────────

/// All 3 pass IDs in declaration order (used for iteration).
pub const ALL_PASSES: [PassId; 3] = [PassId::BuildFusion, PassId::ComputeAt, PassId::ParallelDims];

/// Compute the minimal ordered set of passes needed to produce `terminal`.
/// Returns passes in topological (execution) order.
pub fn required_passes(terminal: PassId) -> Vec<PassId> {
    let mut visited = HashSet::new();
    let mut order = Vec::new();
    visit(terminal, &mut visited, &mut order);
    order
}

fn visit(id: PassId, visited: &mut HashSet<PassId>, order: &mut Vec<PassId>) {
    if !visited.insert(id) {
        return;
    }
    for &dep in descriptor(id).inputs {
        visit(dep, visited, order);
    }
    order.push(id);
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_passes_build_fusion_is_minimal() {
        assert_eq!(required_passes(PassId::BuildFusion), vec![PassId::BuildFusion]);
    }

    #[test]
    fn required_passes_parallel_dims_includes_all() {
        let passes = required_passes(PassId::ParallelDims);
        assert_eq!(passes.len(), 3);
        assert_eq!(
            passes,
            vec![PassId::BuildFusion, PassId::ComputeAt, PassId::ParallelDims]
        );
    }

    #[test]
    fn shared_dependency_visited_once() {
        // ParallelDims names BuildFusion directly and through ComputeAt.
        let passes = required_passes(PassId::ParallelDims);
        let count = passes.iter().filter(|p| **p == PassId::BuildFusion).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn all_descriptors_have_outputs() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            assert!(
                !desc.outputs.is_empty(),
                "pass {:?} has no outputs declared",
                pass
            );
        }
    }

    #[test]
    fn no_parse_in_pass_id() {
        for pass in &ALL_PASSES {
            assert_ne!(descriptor(*pass).name, "parse");
        }
    }

    #[test]
    fn dependency_edges_are_consistent() {
        for pass in &ALL_PASSES {
            let desc = descriptor(*pass);
            for dep in desc.inputs {
                let dep_passes = required_passes(*pass);
                let dep_pos = dep_passes.iter().position(|p| p == dep);
                let self_pos = dep_passes.iter().position(|p| p == pass);
                assert!(
                    dep_pos.unwrap() < self_pos.unwrap(),
                    "{:?} depends on {:?} but it comes later in topological order",
                    pass,
                    dep
                );
            }
        }
    }
}
