// parallel_dims.rs — Parallel dimension map (ParallelAxis → launch dimension)
//
// Decides, once per kernel, the size of every parallel axis the fusion uses
// and whether that size is exact (no out-of-bounds block or thread, so no
// predicate guard). A dimension is the constant extent when the axis maps to
// a unique constant, otherwise a symbolic size expression.
//
// build() walks the fusion once, grouping concrete domains by parallel axis
// and collecting constant extents per concrete domain, then resolves each
// parallel axis. The working state lives only inside build(); the returned
// map is immutable.
//
// Preconditions: the compute-at relation knows every parallel-bound axis.
// Postconditions: every exact axis has a dimension; an exact constant
//   dimension equals the extent of every non-broadcast axis bound to that
//   parallel axis, or the constant registered for that axis's domain.
// Failure modes: conflicting constants for one concrete domain
//   (`ConflictingExtents`); a parallel-bound axis without a concrete domain
//   (`UnmappedAxis`); an axis whose concrete domain is missing from the
//   fusion (`UnknownDomain`). build() returns no partial map.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::ast::Span;
use crate::compute_at::ConcreteDomains;
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::expr::{equal_dim_by, SizeExpr};
use crate::fusion::{Fusion, IterKind, LoopAxis};
use crate::id::AxisId;
use crate::parallel::ParallelAxis;

// ── Options ────────────────────────────────────────────────────────────────

/// Which size becomes the dimension of a parallel axis shared by several
/// concrete domains whose extents are not provably equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RepresentativePolicy {
    /// Extent of the domain collected first during traversal.
    #[default]
    FirstCollected,
    /// Extent of the domain with the lowest AxisId (independent of traversal).
    LowestId,
    /// The launch placeholder (`blockDim.x`, `gridDim.y`, ...).
    LaunchParam,
}

impl RepresentativePolicy {
    pub fn name(self) -> &'static str {
        match self {
            RepresentativePolicy::FirstCollected => "first",
            RepresentativePolicy::LowestId => "lowest_id",
            RepresentativePolicy::LaunchParam => "launch",
        }
    }
}

impl FromStr for RepresentativePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(RepresentativePolicy::FirstCollected),
            "lowest_id" => Ok(RepresentativePolicy::LowestId),
            "launch" => Ok(RepresentativePolicy::LaunchParam),
            other => Err(format!(
                "expected representative policy (first, lowest_id, launch), found '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimMapOptions {
    pub representative: RepresentativePolicy,
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// Fatal inconsistency found while building the map. Each indicates a bug in
/// the upstream compute-at inference, not a recoverable condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimMapError {
    /// One concrete domain collects more than one distinct constant extent.
    ConflictingExtents {
        domain: AxisId,
        name: String,
        values: Vec<i64>,
        span: Span,
    },
    /// A parallel-bound axis has no concrete domain.
    UnmappedAxis {
        axis: AxisId,
        name: String,
        parallel: ParallelAxis,
        span: Span,
    },
    /// The relation returned a concrete domain the fusion does not contain.
    UnknownDomain {
        axis: AxisId,
        name: String,
        domain: AxisId,
        span: Span,
    },
}

impl fmt::Display for DimMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimMapError::ConflictingExtents { name, values, .. } => {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(
                    f,
                    "concrete domain '{}' has conflicting constant extents: {}",
                    name,
                    values.join(", ")
                )
            }
            DimMapError::UnmappedAxis { name, parallel, .. } => write!(
                f,
                "axis '{}' is bound to {} but has no concrete domain",
                name, parallel
            ),
            DimMapError::UnknownDomain { name, domain, .. } => write!(
                f,
                "axis '{}' maps to concrete domain #{} which is not part of the fusion",
                name, domain.0
            ),
        }
    }
}

impl std::error::Error for DimMapError {}

impl DimMapError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            DimMapError::ConflictingExtents { span, .. } => {
                Diagnostic::new(DiagLevel::Error, *span, self.to_string())
                    .with_code(codes::E0301)
                    .with_hint("axes fused into one concrete domain must agree on constant extents")
            }
            DimMapError::UnmappedAxis { span, .. } => {
                Diagnostic::new(DiagLevel::Error, *span, self.to_string()).with_code(codes::E0302)
            }
            DimMapError::UnknownDomain { span, .. } => {
                Diagnostic::new(DiagLevel::Error, *span, self.to_string()).with_code(codes::E0303)
            }
        }
    }
}

// ── Build-scoped working state ─────────────────────────────────────────────

/// Extents observed per concrete domain. Broadcast axes contribute nothing.
#[derive(Debug, Default)]
struct DomainExtents<'a> {
    /// Distinct constant extents.
    constants: HashMap<AxisId, BTreeSet<i64>>,
    /// Extent of the first non-broadcast member, in traversal order.
    members: HashMap<AxisId, &'a SizeExpr>,
}

impl<'a> DomainExtents<'a> {
    fn register(&mut self, domain: AxisId, axis: &'a LoopAxis) {
        if axis.kind == IterKind::Broadcast {
            return;
        }
        if let Some(value) = axis.extent.evaluate() {
            self.constants.entry(domain).or_default().insert(value);
        }
        self.members.entry(domain).or_insert(&axis.extent);
    }

    /// The single constant registered for `domain`, if any.
    fn unique_constant(&self, domain: &LoopAxis) -> Result<Option<i64>, DimMapError> {
        let Some(values) = self.constants.get(&domain.id) else {
            return Ok(None);
        };
        if values.len() > 1 {
            return Err(DimMapError::ConflictingExtents {
                domain: domain.id,
                name: domain.name.clone(),
                values: values.iter().copied().collect(),
                span: domain.span,
            });
        }
        Ok(values.iter().next().copied())
    }

    /// Registered constant if unique, otherwise the domain's own extent. A
    /// broadcast domain stands for its first non-broadcast member instead.
    fn effective(&self, domain: &LoopAxis) -> Result<SizeExpr, DimMapError> {
        if let Some(value) = self.unique_constant(domain)? {
            return Ok(SizeExpr::Const(value));
        }
        let extent = match (domain.kind, self.members.get(&domain.id)) {
            (IterKind::Broadcast, Some(member)) => *member,
            _ => &domain.extent,
        };
        Ok(extent.clone())
    }
}

/// Concrete domains per parallel axis, in first-collected order.
#[derive(Debug, Default)]
struct ParallelDomains<'a> {
    by_axis: BTreeMap<ParallelAxis, Vec<&'a LoopAxis>>,
}

impl<'a> ParallelDomains<'a> {
    fn insert(&mut self, pt: ParallelAxis, domain: &'a LoopAxis) {
        let domains = self.by_axis.entry(pt).or_default();
        if !domains.iter().any(|d| d.id == domain.id) {
            domains.push(domain);
        }
    }
}

// ── Collection ─────────────────────────────────────────────────────────────

/// Concrete domain of `axis`, checked against the fusion.
fn concrete_domain_of<'a, R: ConcreteDomains + ?Sized>(
    fusion: &'a Fusion,
    relation: &R,
    axis: &LoopAxis,
) -> Result<Option<&'a LoopAxis>, DimMapError> {
    relation
        .concrete_domain(axis.id)
        .map(|domain| {
            fusion.axis(domain).ok_or_else(|| DimMapError::UnknownDomain {
                axis: axis.id,
                name: axis.name.clone(),
                domain,
                span: axis.span,
            })
        })
        .transpose()
}

/// Walk the fusion once. Every non-broadcast axis contributes its extent to
/// its concrete domain; every parallel-bound axis contributes its concrete
/// domain to its parallel axis.
fn collect<'a, R: ConcreteDomains + ?Sized>(
    fusion: &'a Fusion,
    relation: &R,
) -> Result<(ParallelDomains<'a>, DomainExtents<'a>), DimMapError> {
    let mut domains = ParallelDomains::default();
    let mut extents = DomainExtents::default();

    for axis in fusion.loop_axes() {
        let domain = concrete_domain_of(fusion, relation, axis)?;
        if let Some(domain) = domain {
            extents.register(domain.id, axis);
        }
        let Some(pt) = axis.parallel else {
            continue;
        };
        let domain = domain.ok_or_else(|| DimMapError::UnmappedAxis {
            axis: axis.id,
            name: axis.name.clone(),
            parallel: pt,
            span: axis.span,
        })?;
        domains.insert(pt, domain);
    }

    Ok((domains, extents))
}

// ── Resolution ─────────────────────────────────────────────────────────────

struct Resolver<'a, R: ?Sized> {
    extents: &'a DomainExtents<'a>,
    relation: &'a R,
    options: &'a DimMapOptions,
}

impl<R: ConcreteDomains + ?Sized> Resolver<'_, R> {
    /// A parallel axis used by one concrete domain needs no guard.
    fn resolve_single(&self, domain: &LoopAxis) -> Result<(SizeExpr, bool), DimMapError> {
        Ok((self.extents.effective(domain)?, true))
    }

    /// Several concrete domains share `pt`. Exact only if every pair of
    /// extents is provably equal.
    fn resolve_multiple(
        &self,
        pt: ParallelAxis,
        domains: &[&LoopAxis],
    ) -> Result<(SizeExpr, bool), DimMapError> {
        let extents = domains
            .iter()
            .map(|d| self.extents.effective(d))
            .collect::<Result<Vec<_>, _>>()?;

        let canonical = |id: AxisId| self.relation.concrete_domain(id).unwrap_or(id);
        let all_equal = extents
            .iter()
            .enumerate()
            .all(|(i, a)| extents[i + 1..].iter().all(|b| equal_dim_by(a, b, &canonical)));
        if all_equal {
            return Ok((extents[0].clone(), true));
        }

        let dim = match self.options.representative {
            RepresentativePolicy::FirstCollected => extents[0].clone(),
            RepresentativePolicy::LowestId => {
                let lowest = domains
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, d)| d.id)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                extents[lowest].clone()
            }
            RepresentativePolicy::LaunchParam => SizeExpr::Launch(pt),
        };
        Ok((dim, false))
    }
}

// ── Dimension map ──────────────────────────────────────────────────────────

/// Finalized ParallelAxis → dimension map for one kernel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelDimensionMap {
    dims: BTreeMap<ParallelAxis, SizeExpr>,
    exact: BTreeSet<ParallelAxis>,
}

/// One row of the map, as serialized by `--emit json`.
#[derive(Debug, Serialize)]
pub struct DimEntry<'a> {
    pub axis: ParallelAxis,
    pub dim: String,
    pub exact: bool,
    pub expr: &'a SizeExpr,
}

impl ParallelDimensionMap {
    /// Build with the default options.
    pub fn build<R: ConcreteDomains + ?Sized>(
        fusion: &Fusion,
        relation: &R,
    ) -> Result<Self, DimMapError> {
        Self::build_with_options(fusion, relation, &DimMapOptions::default())
    }

    pub fn build_with_options<R: ConcreteDomains + ?Sized>(
        fusion: &Fusion,
        relation: &R,
        options: &DimMapOptions,
    ) -> Result<Self, DimMapError> {
        let (domains, extents) = collect(fusion, relation)?;
        let resolver = Resolver {
            extents: &extents,
            relation,
            options,
        };

        let mut map = ParallelDimensionMap::default();
        for (&pt, concrete) in &domains.by_axis {
            let (dim, is_exact) = match concrete.as_slice() {
                [] => continue,
                [single] => resolver.resolve_single(single)?,
                many => resolver.resolve_multiple(pt, many)?,
            };
            if is_exact {
                map.exact.insert(pt);
            }
            map.dims.insert(pt, dim);
        }
        Ok(map)
    }

    /// Dimension of `pt`, or `None` if the kernel does not use it.
    pub fn get(&self, pt: ParallelAxis) -> Option<&SizeExpr> {
        self.dims.get(&pt)
    }

    /// True if the dimension of `pt` is known to be exact. False for unused
    /// axes.
    pub fn is_exact(&self, pt: ParallelAxis) -> bool {
        self.exact.contains(&pt)
    }

    /// Constant dimension of `pt`, if it was specialized to a literal.
    pub fn const_dim(&self, pt: ParallelAxis) -> Option<i64> {
        self.get(pt).and_then(SizeExpr::as_literal)
    }

    pub fn len(&self) -> usize {
        self.dims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Used axes in dump order with their dimension and exactness.
    pub fn iter(&self) -> impl Iterator<Item = (ParallelAxis, &SizeExpr, bool)> + '_ {
        self.dims
            .iter()
            .map(move |(&pt, dim)| (pt, dim, self.exact.contains(&pt)))
    }

    pub fn entries(&self) -> Vec<DimEntry<'_>> {
        self.iter()
            .map(|(axis, expr, exact)| DimEntry {
                axis,
                dim: expr.to_string(),
                exact,
                expr,
            })
            .collect()
    }

    /// Compact JSON, stable across runs; input to the map fingerprint.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(&self.entries()).unwrap_or_default()
    }
}

impl fmt::Display for ParallelDimensionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pt, dim, exact) in self.iter() {
            let marker = if exact { "exact" } else { "non-exact" };
            writeln!(f, "{}: {}, {}", pt, dim, marker)?;
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
