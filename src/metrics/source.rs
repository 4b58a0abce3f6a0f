use std::collections::{BTreeMap, BTreeSet};

use sysinfo::{
    Disks, Networks, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind,
};

use super::open_files;
use super::snapshot::{CpuSample, HostInfo, MemorySample, MountUsage, NetCounters, ProcessRow};
use crate::error::Result;

/// Point-in-time reads over OS-provided counters. The polling engine only
/// talks to this trait; tests substitute a scripted implementation.
pub trait MetricSource {
    fn host_info(&self) -> HostInfo;
    fn cpu(&mut self) -> Result<CpuSample>;
    fn memory(&mut self) -> Result<MemorySample>;
    fn network_counters(&mut self) -> Result<BTreeMap<String, NetCounters>>;
    fn disk_usage(&mut self) -> Result<Vec<MountUsage>>;
    fn process_table(&mut self) -> Result<Vec<ProcessRow>>;
    fn find_pids(&self, pattern: &str, case_sensitive: bool) -> BTreeSet<u32>;
    /// Raw open-file listing lines per PID. Parsing (and its documented
    /// lossiness) happens in `PidStats`.
    fn open_files_for(&self, pids: &BTreeSet<u32>) -> BTreeMap<u32, Vec<String>>;
}

/// Production source backed by sysinfo.
pub struct SysinfoSource {
    sys: System,
    networks: Networks,
    disks: Disks,
    ignore_interfaces: Vec<String>,
    only_interface: Option<String>,
}

impl SysinfoSource {
    pub fn new(ignore_interfaces: Vec<String>, only_interface: Option<String>) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        let networks = Networks::new_with_refreshed_list();
        let disks = Disks::new_with_refreshed_list();
        SysinfoSource {
            sys,
            networks,
            disks,
            ignore_interfaces: ignore_interfaces
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
            only_interface,
        }
    }

    /// sysinfo computes CPU% from the delta between two refreshes; a freshly
    /// constructed source has no delta yet. One-shot mode calls this to get a
    /// real reading; loop mode gets the same effect from the tick interval.
    pub fn settle_cpu(&mut self) {
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys.refresh_cpu_all();
    }

    fn interface_hidden(&self, name: &str) -> bool {
        if let Some(only) = &self.only_interface {
            return name != only;
        }
        // Loopback is always exact-matched; the rest are substring patterns
        // (the docker/podman/veth zoo renames freely).
        if name == "lo" || name == "lo0" {
            return true;
        }
        let lower = name.to_lowercase();
        self.ignore_interfaces.iter().any(|p| lower.contains(p))
    }

    pub fn interface_known(&self, name: &str) -> bool {
        self.networks.iter().any(|(iface, _)| iface == name)
    }
}

impl MetricSource for SysinfoSource {
    fn host_info(&self) -> HostInfo {
        let mut interfaces = BTreeMap::new();
        for (name, data) in self.networks.iter() {
            if self.interface_hidden(name) {
                continue;
            }
            let ip = data
                .ip_networks()
                .first()
                .map(|net| net.addr.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mac = data.mac_address().to_string();
            interfaces.insert(name.clone(), (ip, mac));
        }

        HostInfo {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            os_release: System::os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_count: self.sys.cpus().len(),
            total_memory: self.sys.total_memory(),
            interfaces,
        }
    }

    fn cpu(&mut self) -> Result<CpuSample> {
        self.sys.refresh_cpu_all();
        Ok(CpuSample {
            overall: self.sys.global_cpu_usage(),
            per_core: self.sys.cpus().iter().map(|cpu| cpu.cpu_usage()).collect(),
        })
    }

    fn memory(&mut self) -> Result<MemorySample> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        let percent = if total > 0 {
            (used as f32 / total as f32) * 100.0
        } else {
            0.0
        };
        Ok(MemorySample {
            percent,
            used_bytes: used,
            total_bytes: total,
        })
    }

    fn network_counters(&mut self) -> Result<BTreeMap<String, NetCounters>> {
        self.networks.refresh(true);
        let mut out = BTreeMap::new();
        for (name, data) in self.networks.iter() {
            if self.interface_hidden(name) {
                continue;
            }
            out.insert(
                name.clone(),
                NetCounters {
                    bytes_sent: data.total_transmitted(),
                    bytes_recv: data.total_received(),
                    errin: data.total_errors_on_received(),
                    errout: data.total_errors_on_transmitted(),
                },
            );
        }
        Ok(out)
    }

    fn disk_usage(&mut self) -> Result<Vec<MountUsage>> {
        self.disks.refresh(true);
        let mut out = Vec::new();
        for disk in self.disks.list() {
            let total = disk.total_space();
            let available = disk.available_space();
            let used = total.saturating_sub(available);
            out.push(MountUsage {
                device: disk.name().to_string_lossy().to_string(),
                fstype: disk.file_system().to_string_lossy().to_string(),
                mount_point: disk.mount_point().to_string_lossy().to_string(),
                total_bytes: total,
                percent: if total > 0 {
                    (used as f32 / total as f32) * 100.0
                } else {
                    0.0
                },
            });
        }
        out.sort_by(|a, b| a.mount_point.cmp(&b.mount_point));
        Ok(out)
    }

    fn process_table(&mut self) -> Result<Vec<ProcessRow>> {
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        let total_memory = self.sys.total_memory();
        let mut rows = Vec::with_capacity(self.sys.processes().len());
        for (pid, process) in self.sys.processes() {
            let command = if process.cmd().is_empty() {
                process.name().to_string_lossy().to_string()
            } else {
                process
                    .cmd()
                    .iter()
                    .map(|s| s.to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            let mem_percent = if total_memory > 0 {
                (process.memory() as f32 / total_memory as f32) * 100.0
            } else {
                0.0
            };
            rows.push(ProcessRow {
                pid: pid.as_u32(),
                user: process
                    .user_id()
                    .map(|uid| uid.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                command,
                cpu_percent: process.cpu_usage(),
                mem_percent,
                start_time: process.start_time(),
                cpu_time_ms: process.accumulated_cpu_time(),
            });
        }
        rows.sort_unstable_by_key(|r| r.pid);
        Ok(rows)
    }

    fn find_pids(&self, pattern: &str, case_sensitive: bool) -> BTreeSet<u32> {
        self.sys
            .processes()
            .iter()
            .filter(|(_, process)| {
                name_matches(&process.name().to_string_lossy(), pattern, case_sensitive)
            })
            .map(|(pid, _)| pid.as_u32())
            .collect()
    }

    fn open_files_for(&self, pids: &BTreeSet<u32>) -> BTreeMap<u32, Vec<String>> {
        pids.iter()
            .map(|&pid| (pid, open_files::list_raw(pid)))
            .collect()
    }
}

/// Substring process-name match; no globs, no fuzziness.
pub fn name_matches(name: &str, pattern: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        name.contains(pattern)
    } else {
        name.to_lowercase().contains(&pattern.to_lowercase())
    }
}
