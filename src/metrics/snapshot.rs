use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

/// Point-in-time CPU usage, overall plus one entry per logical core.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CpuSample {
    pub overall: f32,
    pub per_core: Vec<f32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemorySample {
    pub percent: f32,
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Raw per-interface counters. Rates are derived downstream against the
/// previous tick's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub errin: u64,
    pub errout: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MountUsage {
    pub device: String,
    pub fstype: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub percent: f32,
}

/// One row of the OS process table, as read in a single pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessRow {
    pub pid: u32,
    pub user: String,
    pub command: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    /// Seconds since the epoch at which the process started.
    pub start_time: u64,
    /// Accumulated CPU time in milliseconds.
    pub cpu_time_ms: u64,
}

/// Immutable value produced once per tick and discarded after render.
///
/// A `None` category either was not requested or failed to collect this
/// tick; the renderer shows it as unavailable in the latter case.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    pub taken_at: Option<Instant>,
    pub cpu: Option<CpuSample>,
    pub memory: Option<MemorySample>,
    pub network: Option<BTreeMap<String, NetCounters>>,
    pub disks: Option<Vec<MountUsage>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Snapshot {
            taken_at: Some(Instant::now()),
            cpu: None,
            memory: None,
            network: None,
            disks: None,
        }
    }
}

/// Static host facts sampled once at startup and never diffed again.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub os_release: String,
    pub kernel: String,
    pub architecture: String,
    pub cpu_count: usize,
    pub total_memory: u64,
    /// Interface name -> (first IP, MAC), local/container interfaces
    /// already filtered out.
    pub interfaces: BTreeMap<String, (String, String)>,
}
