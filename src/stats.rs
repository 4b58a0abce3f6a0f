use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

use crate::metrics::snapshot::ProcessRow;
use crate::metrics::{MetricSource, open_files};

/// Aggregated per-process view for one tracked PID.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub user: String,
    pub command: String,
    pub cpu_percent: f32,
    pub mem_percent: f32,
    /// Seconds since the epoch at which the process started.
    pub start_time: u64,
    /// Accumulated CPU time, derived from the table's reported counter.
    pub cumulative_time: Duration,
    pub open_files: BTreeSet<String>,
}

impl ProcessRecord {
    fn from_row(row: &ProcessRow) -> Self {
        ProcessRecord {
            pid: row.pid,
            user: row.user.clone(),
            command: row.command.clone(),
            cpu_percent: row.cpu_percent,
            mem_percent: row.mem_percent,
            start_time: row.start_time,
            cumulative_time: Duration::from_millis(row.cpu_time_ms),
            open_files: BTreeSet::new(),
        }
    }
}

/// Which PIDs a `PidStats` follows.
#[derive(Debug, Clone)]
enum Tracked {
    /// Every PID in the process table (the default table view).
    All,
    /// An explicit set, fed by name search.
    Set(BTreeSet<u32>),
}

/// Owns the tracked-PID set and the latest `ProcessRecord` per PID.
///
/// A PID disappearing from the process table during `refresh` is the
/// exit-detection signal: the PID is dropped from the tracked set and from
/// the records, never surfaced as an error.
#[derive(Debug)]
pub struct PidStats {
    tracked: Tracked,
    records: BTreeMap<u32, ProcessRecord>,
}

impl PidStats {
    /// Follow every process in the table.
    pub fn all() -> Self {
        PidStats {
            tracked: Tracked::All,
            records: BTreeMap::new(),
        }
    }

    /// Follow only explicitly tracked PIDs.
    pub fn explicit() -> Self {
        PidStats {
            tracked: Tracked::Set(BTreeSet::new()),
            records: BTreeMap::new(),
        }
    }

    /// Add PIDs to the tracked set. Idempotent; no-op in track-all mode.
    pub fn track<I: IntoIterator<Item = u32>>(&mut self, pids: I) {
        if let Tracked::Set(set) = &mut self.tracked {
            set.extend(pids);
        }
    }

    /// Remove PIDs from the tracked set. Idempotent; absent PIDs are fine.
    pub fn untrack<I: IntoIterator<Item = u32>>(&mut self, pids: I) {
        if let Tracked::Set(set) = &mut self.tracked {
            for pid in pids {
                set.remove(&pid);
                self.records.remove(&pid);
            }
        }
    }

    pub fn tracked_pids(&self) -> BTreeSet<u32> {
        match &self.tracked {
            Tracked::All => self.records.keys().copied().collect(),
            Tracked::Set(set) => set.clone(),
        }
    }

    /// Re-derive every tracked record from one consistent process-table
    /// snapshot. Returns the refreshed records; exited PIDs are gone from
    /// both the result and the tracked set.
    pub fn refresh(&mut self, table: &[ProcessRow]) -> &BTreeMap<u32, ProcessRecord> {
        let by_pid: BTreeMap<u32, &ProcessRow> =
            table.iter().map(|row| (row.pid, row)).collect();

        match &mut self.tracked {
            Tracked::All => {
                self.records.retain(|pid, _| by_pid.contains_key(pid));
                for (pid, row) in &by_pid {
                    let open = self
                        .records
                        .get(pid)
                        .map(|r| r.open_files.clone())
                        .unwrap_or_default();
                    let mut record = ProcessRecord::from_row(row);
                    record.open_files = open;
                    self.records.insert(*pid, record);
                }
            }
            Tracked::Set(set) => {
                set.retain(|pid| by_pid.contains_key(pid));
                self.records.retain(|pid, _| set.contains(pid));
                for pid in set.iter() {
                    if let Some(row) = by_pid.get(pid) {
                        let open = self
                            .records
                            .get(pid)
                            .map(|r| r.open_files.clone())
                            .unwrap_or_default();
                        let mut record = ProcessRecord::from_row(row);
                        record.open_files = open;
                        self.records.insert(*pid, record);
                    }
                }
            }
        }
        &self.records
    }

    pub fn records(&self) -> &BTreeMap<u32, ProcessRecord> {
        &self.records
    }

    /// List open files for the given PIDs and fold them into the records.
    /// Comparatively expensive; callers invoke it on their own cadence, not
    /// every tick. Non-path descriptors (sockets, pipes, anonymous maps)
    /// are silently excluded.
    pub fn open_files<S: MetricSource>(
        &mut self,
        source: &S,
        pids: &BTreeSet<u32>,
    ) -> BTreeMap<u32, BTreeSet<String>> {
        let raw = source.open_files_for(pids);
        let mut out = BTreeMap::new();
        for (pid, lines) in raw {
            let paths: BTreeSet<String> =
                lines.iter().filter_map(|l| open_files::parse_path(l)).collect();
            if let Some(record) = self.records.get_mut(&pid) {
                record.open_files = paths.clone();
            }
            out.insert(pid, paths);
        }
        out
    }
}
