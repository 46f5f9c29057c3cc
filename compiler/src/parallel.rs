// parallel.rs — Physical parallelization axes of a GPU kernel launch
//
// Three block-level and three thread-level indices. Used as map keys by the
// dimension map and as the names of launch-configuration placeholders.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// One of the six launch-grid axes (block/thread × x/y/z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ParallelAxis {
    BIDx,
    BIDy,
    BIDz,
    TIDx,
    TIDy,
    TIDz,
}

/// All parallel axes in dump order.
pub const ALL_PARALLEL_AXES: [ParallelAxis; 6] = [
    ParallelAxis::BIDx,
    ParallelAxis::BIDy,
    ParallelAxis::BIDz,
    ParallelAxis::TIDx,
    ParallelAxis::TIDy,
    ParallelAxis::TIDz,
];

impl ParallelAxis {
    pub fn is_block(self) -> bool {
        matches!(
            self,
            ParallelAxis::BIDx | ParallelAxis::BIDy | ParallelAxis::BIDz
        )
    }

    pub fn is_thread(self) -> bool {
        !self.is_block()
    }

    /// Name of the launch-configuration variable holding this axis' size
    /// (`gridDim.x` for block axes, `blockDim.x` for thread axes).
    pub fn launch_dim_name(self) -> &'static str {
        match self {
            ParallelAxis::BIDx => "gridDim.x",
            ParallelAxis::BIDy => "gridDim.y",
            ParallelAxis::BIDz => "gridDim.z",
            ParallelAxis::TIDx => "blockDim.x",
            ParallelAxis::TIDy => "blockDim.y",
            ParallelAxis::TIDz => "blockDim.z",
        }
    }

    /// Inverse of [`launch_dim_name`](Self::launch_dim_name).
    pub fn from_launch_dim_name(name: &str) -> Option<Self> {
        ALL_PARALLEL_AXES
            .iter()
            .copied()
            .find(|pt| pt.launch_dim_name() == name)
    }
}

impl fmt::Display for ParallelAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParallelAxis::BIDx => "BIDx",
            ParallelAxis::BIDy => "BIDy",
            ParallelAxis::BIDz => "BIDz",
            ParallelAxis::TIDx => "TIDx",
            ParallelAxis::TIDy => "TIDy",
            ParallelAxis::TIDz => "TIDz",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ParallelAxis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_PARALLEL_AXES
            .iter()
            .copied()
            .find(|pt| pt.to_string() == s)
            .ok_or_else(|| {
                format!(
                    "expected parallel axis (BIDx, BIDy, BIDz, TIDx, TIDy, TIDz), found '{}'",
                    s
                )
            })
    }
}
