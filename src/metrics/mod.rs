pub mod open_files;
pub mod snapshot;
pub mod source;

use std::fmt;

pub use snapshot::{CpuSample, HostInfo, MemorySample, MountUsage, NetCounters, Snapshot};
pub use source::{MetricSource, SysinfoSource};

/// Metric categories the scheduler can be asked to sample each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Cpu,
    Memory,
    Network,
    Disks,
    Processes,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Cpu,
        Category::Memory,
        Category::Network,
        Category::Disks,
        Category::Processes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Cpu => "cpu",
            Category::Memory => "memory",
            Category::Network => "network",
            Category::Disks => "disks",
            Category::Processes => "processes",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
