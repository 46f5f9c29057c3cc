// id.rs — Stable identifiers for fusion entities
//
// Loop axes and tensors are numbered in declaration order as the fusion is
// built. The numbering is the identity used for canonical domains, so it must
// be deterministic across runs for reproducible output.

use serde::Serialize;

/// Stable identifier for a loop axis (iteration domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AxisId(pub u32);

/// Stable identifier for a tensor in a fusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TensorId(pub u32);

impl AxisId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TensorId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (declaration) order.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next_axis: u32,
    next_tensor: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_axis(&mut self) -> AxisId {
        let id = AxisId(self.next_axis);
        self.next_axis += 1;
        id
    }

    pub fn alloc_tensor(&mut self) -> TensorId {
        let id = TensorId(self.next_tensor);
        self.next_tensor += 1;
        id
    }
}
