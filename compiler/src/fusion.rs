// fusion.rs — Fused computation model consumed by the dimension pass
//
// A fusion is an ordered list of tensors, each owning an ordered list of loop
// axes. Each loop axis has a size expression, an iteration kind, and an
// optional parallel-axis binding. Axis and tensor IDs are allocated in
// declaration order; `loop_axes()` walks tensors then axes in that order and
// is the single traversal order every pass relies on.
//
// Preconditions: none.
// Postconditions: every axis belongs to exactly one tensor.
// Failure modes: none (construction is infallible; name checks live in lower.rs).
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::ast::{no_span, Span};
use crate::expr::SizeExpr;
use crate::id::{AxisId, IdAllocator, TensorId};
use crate::parallel::ParallelAxis;

/// Iteration kind of a loop axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IterKind {
    #[default]
    Iteration,
    Reduction,
    /// Size-1 broadcast axis; its extent does not describe the loop it is
    /// fused into.
    Broadcast,
}

/// A named iteration dimension of one tensor.
#[derive(Debug, Clone)]
pub struct LoopAxis {
    pub id: AxisId,
    pub name: String,
    pub tensor: TensorId,
    pub extent: SizeExpr,
    pub kind: IterKind,
    pub parallel: Option<ParallelAxis>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Tensor {
    pub id: TensorId,
    pub name: String,
    pub axes: Vec<AxisId>,
    pub span: Span,
}

/// The fused computation: tensors and their loop axes.
#[derive(Debug, Clone, Default)]
pub struct Fusion {
    ids: IdAllocator,
    tensors: Vec<Tensor>,
    axes: Vec<LoopAxis>,
    axis_names: HashMap<String, AxisId>,
}

impl Fusion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tensor(&mut self, name: impl Into<String>) -> TensorId {
        let id = self.ids.alloc_tensor();
        self.tensors.push(Tensor {
            id,
            name: name.into(),
            axes: Vec::new(),
            span: no_span(),
        });
        id
    }

    /// Append a loop axis to `tensor`. A later axis with the same name
    /// shadows the earlier one in `find_axis`.
    pub fn add_axis(
        &mut self,
        tensor: TensorId,
        name: impl Into<String>,
        extent: SizeExpr,
        parallel: Option<ParallelAxis>,
    ) -> AxisId {
        let id = self.ids.alloc_axis();
        let name = name.into();
        self.axis_names.insert(name.clone(), id);
        self.axes.push(LoopAxis {
            id,
            name,
            tensor,
            extent,
            kind: IterKind::Iteration,
            parallel,
            span: no_span(),
        });
        self.tensors[tensor.index()].axes.push(id);
        id
    }

    pub fn set_kind(&mut self, axis: AxisId, kind: IterKind) {
        self.axes[axis.index()].kind = kind;
    }

    pub(crate) fn set_axis_span(&mut self, axis: AxisId, span: Span) {
        self.axes[axis.index()].span = span;
    }

    pub(crate) fn set_tensor_span(&mut self, tensor: TensorId, span: Span) {
        self.tensors[tensor.index()].span = span;
    }

    pub fn axis(&self, id: AxisId) -> Option<&LoopAxis> {
        self.axes.get(id.index())
    }

    pub fn tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(id.index())
    }

    pub fn find_axis(&self, name: &str) -> Option<AxisId> {
        self.axis_names.get(name).copied()
    }

    pub fn find_tensor(&self, name: &str) -> Option<TensorId> {
        self.tensors.iter().find(|t| t.name == name).map(|t| t.id)
    }

    /// `extent(axis)` as a size expression.
    pub fn extent_ref(&self, id: AxisId) -> Option<SizeExpr> {
        self.axis(id)
            .map(|axis| SizeExpr::extent(axis.id, axis.name.clone()))
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// All loop axes in traversal order: tensors in declaration order, then
    /// each tensor's axes in declaration order.
    pub fn loop_axes(&self) -> impl Iterator<Item = &LoopAxis> + '_ {
        self.tensors
            .iter()
            .flat_map(move |t| t.axes.iter().map(move |id| &self.axes[id.index()]))
    }
}

impl fmt::Display for Fusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tensor in &self.tensors {
            writeln!(f, "tensor {} {{", tensor.name)?;
            for id in &tensor.axes {
                let axis = &self.axes[id.index()];
                let prefix = match axis.kind {
                    IterKind::Iteration => "",
                    IterKind::Reduction => "reduce ",
                    IterKind::Broadcast => "bcast ",
                };
                write!(f, "  {}{} = {}", prefix, axis.name, axis.extent)?;
                if let Some(pt) = axis.parallel {
                    write!(f, " @ {}", pt)?;
                }
                writeln!(f)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}
