// Property-based tests for dimension-map invariants.
//
// Random fusions (constant and symbolic extents, iteration, reduction and
// broadcast axes, random parallel bindings, random fuse pairs) are built
// directly through the library API and checked against the invariants every
// map must satisfy:
// 1. Determinism: identical input → identical map (or identical error)
// 2. Absence: unused parallel axes have no dimension and are not exact
// 3. Soundness: an exact constant dimension matches every bound constant
//    extent, and an exact dimension is the extent of some non-broadcast axis
//    in the domain of every axis bound to it
// 4. Exactness does not depend on the representative policy
// 5. Generated .fus text parses, lowers and agrees with the direct build
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use pdim::compute_at::{ComputeAtMap, ConcreteDomains};
use pdim::expr::{equal_dim, SizeExpr};
use pdim::fusion::{Fusion, IterKind};
use pdim::id::AxisId;
use pdim::parallel::{ParallelAxis, ALL_PARALLEL_AXES};
use pdim::parallel_dims::{DimMapOptions, ParallelDimensionMap, RepresentativePolicy};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ── Fusion generator ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct AxisShape {
    kind: IterKind,
    extent: SizeExpr,
    parallel: Option<ParallelAxis>,
}

#[derive(Debug, Clone)]
struct FusionShape {
    /// Axes grouped by tensor.
    tensors: Vec<Vec<AxisShape>>,
    /// Fuse pairs as indices into the flattened axis list.
    fuses: Vec<(usize, usize)>,
}

fn arb_extent() -> impl Strategy<Value = SizeExpr> {
    prop_oneof![
        prop_oneof![Just(1i64), Just(4), Just(32), Just(128)].prop_map(SizeExpr::Const),
        prop_oneof![Just("N"), Just("M")].prop_map(|s| SizeExpr::symbol(s)),
    ]
}

fn arb_parallel() -> impl Strategy<Value = Option<ParallelAxis>> {
    prop_oneof![
        2 => Just(None),
        1 => Just(Some(ParallelAxis::BIDx)),
        1 => Just(Some(ParallelAxis::TIDx)),
        1 => Just(Some(ParallelAxis::TIDy)),
    ]
}

fn arb_kind() -> impl Strategy<Value = IterKind> {
    prop_oneof![
        3 => Just(IterKind::Iteration),
        1 => Just(IterKind::Reduction),
        1 => Just(IterKind::Broadcast),
    ]
}

fn arb_fusion() -> impl Strategy<Value = FusionShape> {
    let axis = (arb_kind(), arb_extent(), arb_parallel()).prop_map(|(kind, extent, parallel)| {
        // Broadcast axes are always size 1.
        let extent = match kind {
            IterKind::Broadcast => SizeExpr::Const(1),
            _ => extent,
        };
        AxisShape {
            kind,
            extent,
            parallel,
        }
    });
    prop::collection::vec(prop::collection::vec(axis, 1..=3), 1..=4).prop_flat_map(|tensors| {
        let n: usize = tensors.iter().map(|t| t.len()).sum();
        let fuses = prop::collection::vec((0..n, 0..n), 0..=3);
        (Just(tensors), fuses).prop_map(|(tensors, fuses)| FusionShape { tensors, fuses })
    })
}

fn build_fusion(shape: &FusionShape) -> (Fusion, ComputeAtMap) {
    let fusion = fusion_of(shape);
    let map = relation_of(shape, ComputeAtMap::identity(&fusion));
    (fusion, map)
}

/// Same fusion, with a relation that does not know which axes are
/// broadcasts, so a broadcast axis can end up as a concrete domain.
fn build_fusion_kind_blind(shape: &FusionShape) -> (Fusion, ComputeAtMap) {
    let fusion = fusion_of(shape);
    let mut map = ComputeAtMap::default();
    if fusion.axis_count() > 0 {
        map.register(AxisId(fusion.axis_count() as u32 - 1));
    }
    (fusion, relation_of(shape, map))
}

fn fusion_of(shape: &FusionShape) -> Fusion {
    let mut fusion = Fusion::new();
    let mut next = 0;
    for (t, axes) in shape.tensors.iter().enumerate() {
        let tensor = fusion.add_tensor(format!("T{}", t));
        for axis in axes {
            let id = fusion.add_axis(tensor, format!("i{}", next), axis.extent.clone(), axis.parallel);
            fusion.set_kind(id, axis.kind);
            next += 1;
        }
    }
    fusion
}

fn relation_of(shape: &FusionShape, mut map: ComputeAtMap) -> ComputeAtMap {
    for &(a, b) in &shape.fuses {
        map.union(AxisId(a as u32), AxisId(b as u32));
    }
    map
}

/// Every non-broadcast axis bound to an exact parallel axis shares its
/// concrete domain with a non-broadcast axis whose extent is the dimension.
fn check_exact_dims_cover_bound_axes(
    fusion: &Fusion,
    relation: &ComputeAtMap,
    map: &ParallelDimensionMap,
) -> Result<(), TestCaseError> {
    for pt in ALL_PARALLEL_AXES {
        if !map.is_exact(pt) {
            continue;
        }
        let Some(dim) = map.get(pt) else { continue };
        let bound = fusion
            .loop_axes()
            .filter(|a| a.parallel == Some(pt) && a.kind != IterKind::Broadcast);
        for axis in bound {
            let domain = relation.concrete_domain(axis.id);
            let covered = fusion.loop_axes().any(|m| {
                m.kind != IterKind::Broadcast
                    && relation.concrete_domain(m.id) == domain
                    && equal_dim(dim, &m.extent)
            });
            prop_assert!(
                covered,
                "{} = {} is exact but no axis in the domain of {} has that extent",
                pt,
                dim,
                axis.name
            );
        }
    }
    Ok(())
}

fn build(shape: &FusionShape, policy: RepresentativePolicy) -> Option<ParallelDimensionMap> {
    let (fusion, map) = build_fusion(shape);
    let options = DimMapOptions {
        representative: policy,
    };
    ParallelDimensionMap::build_with_options(&fusion, &map, &options).ok()
}

fn to_source(shape: &FusionShape) -> String {
    let mut src = String::new();
    let mut next = 0;
    for (t, axes) in shape.tensors.iter().enumerate() {
        src.push_str(&format!("tensor T{} {{\n", t));
        for axis in axes {
            let prefix = match axis.kind {
                IterKind::Iteration => "",
                IterKind::Reduction => "reduce ",
                IterKind::Broadcast => "bcast ",
            };
            src.push_str(&format!("  {}i{} = {}", prefix, next, axis.extent));
            if let Some(pt) = axis.parallel {
                src.push_str(&format!(" @ {}", pt));
            }
            src.push('\n');
            next += 1;
        }
        src.push_str("}\n");
    }
    for &(a, b) in &shape.fuses {
        if a != b {
            src.push_str(&format!("fuse i{}, i{}\n", a, b));
        }
    }
    src
}

// ── 1-4. Map invariants ─────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn build_is_deterministic(shape in arb_fusion()) {
        let (fusion, map) = build_fusion(&shape);
        let a = ParallelDimensionMap::build(&fusion, &map);
        let b = ParallelDimensionMap::build(&fusion, &map);
        prop_assert_eq!(&a, &b);
        if let (Ok(a), Ok(b)) = (a, b) {
            prop_assert_eq!(a.to_string(), b.to_string());
            prop_assert_eq!(a.canonical_json(), b.canonical_json());
        }
    }

    #[test]
    fn unused_axes_are_absent(shape in arb_fusion()) {
        let Some(map) = build(&shape, RepresentativePolicy::FirstCollected) else {
            return Ok(());
        };
        let used: Vec<ParallelAxis> = shape
            .tensors
            .iter()
            .flatten()
            .filter_map(|a| a.parallel)
            .collect();
        for pt in ALL_PARALLEL_AXES {
            if used.contains(&pt) {
                prop_assert!(map.get(pt).is_some(), "{} is bound but has no dimension", pt);
            } else {
                prop_assert!(map.get(pt).is_none());
                prop_assert!(!map.is_exact(pt));
            }
        }
    }

    #[test]
    fn exact_constant_matches_bound_constants(shape in arb_fusion()) {
        let Some(map) = build(&shape, RepresentativePolicy::FirstCollected) else {
            return Ok(());
        };
        let (fusion, relation) = build_fusion(&shape);
        for pt in ALL_PARALLEL_AXES {
            if !map.is_exact(pt) {
                continue;
            }
            let Some(c) = map.const_dim(pt) else { continue };
            let bound = fusion
                .loop_axes()
                .filter(|a| a.parallel == Some(pt) && a.kind != IterKind::Broadcast);
            for axis in bound {
                if let Some(v) = axis.extent.evaluate() {
                    prop_assert_eq!(v, c, "axis {} bound to {} disagrees", axis.name, pt);
                }
                // Every axis sharing its concrete domain agrees as well.
                let domain = relation.concrete_domain(axis.id);
                for other in fusion.loop_axes().filter(|a| a.kind != IterKind::Broadcast) {
                    if relation.concrete_domain(other.id) == domain {
                        if let Some(v) = other.extent.evaluate() {
                            prop_assert_eq!(v, c);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn exact_dims_cover_bound_axes(shape in arb_fusion()) {
        for (fusion, relation) in [build_fusion(&shape), build_fusion_kind_blind(&shape)] {
            let Ok(map) = ParallelDimensionMap::build(&fusion, &relation) else {
                continue;
            };
            check_exact_dims_cover_bound_axes(&fusion, &relation, &map)?;
        }
    }

    #[test]
    fn exactness_is_policy_independent(shape in arb_fusion()) {
        let first = build(&shape, RepresentativePolicy::FirstCollected);
        let lowest = build(&shape, RepresentativePolicy::LowestId);
        let launch = build(&shape, RepresentativePolicy::LaunchParam);
        prop_assert_eq!(first.is_some(), lowest.is_some());
        prop_assert_eq!(first.is_some(), launch.is_some());
        let (Some(first), Some(lowest), Some(launch)) = (first, lowest, launch) else {
            return Ok(());
        };
        for pt in ALL_PARALLEL_AXES {
            prop_assert_eq!(first.is_exact(pt), lowest.is_exact(pt));
            prop_assert_eq!(first.is_exact(pt), launch.is_exact(pt));
            if first.is_exact(pt) {
                // Exact dimensions do not depend on the representative choice.
                prop_assert_eq!(first.get(pt), lowest.get(pt));
                prop_assert_eq!(first.get(pt), launch.get(pt));
            } else if first.get(pt).is_some() {
                prop_assert_eq!(launch.get(pt), Some(&SizeExpr::Launch(pt)));
            }
        }
    }

    #[test]
    fn single_domain_axes_are_exact(shape in arb_fusion()) {
        let Some(map) = build(&shape, RepresentativePolicy::FirstCollected) else {
            return Ok(());
        };
        let (fusion, relation) = build_fusion(&shape);
        for pt in ALL_PARALLEL_AXES {
            let mut domains: Vec<_> = fusion
                .loop_axes()
                .filter(|a| a.parallel == Some(pt))
                .filter_map(|a| relation.concrete_domain(a.id))
                .collect();
            domains.sort();
            domains.dedup();
            if domains.len() == 1 {
                prop_assert!(map.is_exact(pt), "{} has one domain but is not exact", pt);
            }
        }
    }

    #[test]
    fn non_exact_axes_span_several_domains(shape in arb_fusion()) {
        let Some(map) = build(&shape, RepresentativePolicy::FirstCollected) else {
            return Ok(());
        };
        let (fusion, relation) = build_fusion(&shape);
        for pt in ALL_PARALLEL_AXES {
            if map.get(pt).is_none() || map.is_exact(pt) {
                continue;
            }
            let domains: BTreeSet<_> = fusion
                .loop_axes()
                .filter(|a| a.parallel == Some(pt))
                .filter_map(|a| relation.concrete_domain(a.id))
                .collect();
            prop_assert!(domains.len() > 1, "{} is non-exact with one domain", pt);
        }
    }
}

// ── 5. Text front end agrees with the direct build ──────────────────────────

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        max_shrink_iters: 500,
        .. ProptestConfig::default()
    })]

    #[test]
    fn generated_source_matches_direct_build(shape in arb_fusion()) {
        let src = to_source(&shape);
        let parsed = pdim::parser::parse(&src);
        prop_assert!(parsed.errors.is_empty(), "parse errors for:\n{}\n{:?}", src, parsed.errors);
        let program = parsed.program.unwrap();

        let lowered = pdim::lower::lower(&program);
        prop_assert!(!lowered.has_errors(), "lower errors: {:?}", lowered.diagnostics);
        let compute_at = pdim::compute_at::build_compute_at(&lowered.fusion, &lowered.fuse_groups);

        let from_text = ParallelDimensionMap::build(&lowered.fusion, &compute_at.map).ok();
        let direct = build(&shape, RepresentativePolicy::FirstCollected);
        prop_assert_eq!(from_text, direct, "source:\n{}", src);
    }
}
