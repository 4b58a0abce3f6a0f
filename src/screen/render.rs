//! Pure rendering: turn one tick's data into ordered (region, text) pairs.
//! No terminal I/O happens here; the writer diffs and issues the writes.

use std::collections::{BTreeMap, HashSet};

use crate::format::{UNAVAILABLE, format_bytes, format_rate, percent_bar, truncate_unicode};
use crate::history::{AvgStore, NetRates};
use crate::metrics::{Category, HostInfo, Snapshot};
use crate::stats::ProcessRecord;

const BAR_WIDTH: usize = 20;
const COMMAND_WIDTH: usize = 40;
/// Open-file lines shown under a traced process row.
const MAX_FILE_LINES: usize = 5;

/// Stable identity of one display region. A region maps to one terminal
/// row; the writer redraws a region only when its text or row changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegionId {
    CpuOverall,
    CpuCore(usize),
    Memory,
    Interface(String),
    Mount(String),
    ProcessHeader,
    ProcessRow(u32),
    OpenFile(u32, usize),
}

/// Everything a tick hands to the screen: the snapshot, the refreshed
/// process records, derived rates and running averages. `records` is `None`
/// when the process-table read failed this tick.
pub struct FrameInput<'a> {
    pub snapshot: &'a Snapshot,
    pub records: Option<&'a BTreeMap<u32, ProcessRecord>>,
    pub rates: &'a BTreeMap<String, NetRates>,
    pub averages: &'a AvgStore,
    pub categories: &'a HashSet<Category>,
    pub max_rows: usize,
    pub show_open_files: bool,
}

/// Static header lines, written once at startup and never diffed again.
pub fn host_lines(host: &HostInfo) -> Vec<String> {
    let mut lines = vec![
        format!(
            "{}  {} {}  {} cpus  {} memory",
            host.hostname,
            host.os_release,
            host.architecture,
            host.cpu_count,
            format_bytes(host.total_memory),
        ),
        format!("kernel {}", host.kernel),
    ];
    for (iface, (ip, mac)) in &host.interfaces {
        lines.push(format!("{iface}  ip {ip}  mac {mac}"));
    }
    lines.push(String::new());
    lines
}

/// Build the ordered dynamic region list for one tick.
pub fn build_regions(input: &FrameInput<'_>) -> Vec<(RegionId, String)> {
    let mut out = Vec::new();

    if input.categories.contains(&Category::Cpu) {
        match &input.snapshot.cpu {
            Some(cpu) => {
                out.push((
                    RegionId::CpuOverall,
                    format!(
                        "cpu   {} {:5.1}%  {}",
                        percent_bar(cpu.overall, BAR_WIDTH),
                        cpu.overall,
                        avg_label(input.averages.cpu_avg()),
                    ),
                ));
                for (i, core) in cpu.per_core.iter().enumerate() {
                    out.push((
                        RegionId::CpuCore(i),
                        format!("  c{i:<3} {} {core:5.1}%", percent_bar(*core, BAR_WIDTH)),
                    ));
                }
            }
            None => out.push((RegionId::CpuOverall, format!("cpu   {UNAVAILABLE}"))),
        }
    }

    if input.categories.contains(&Category::Memory) {
        match &input.snapshot.memory {
            Some(mem) => out.push((
                RegionId::Memory,
                format!(
                    "mem   {} {:5.1}%  ({} / {})  {}",
                    percent_bar(mem.percent, BAR_WIDTH),
                    mem.percent,
                    format_bytes(mem.used_bytes),
                    format_bytes(mem.total_bytes),
                    avg_label(input.averages.memory_avg()),
                ),
            )),
            None => out.push((RegionId::Memory, format!("mem   {UNAVAILABLE}"))),
        }
    }

    if input.categories.contains(&Category::Network) {
        match &input.snapshot.network {
            Some(interfaces) => {
                for iface in interfaces.keys() {
                    let rates = input.rates.get(iface).copied().unwrap_or_default();
                    out.push((
                        RegionId::Interface(iface.clone()),
                        format!(
                            "net   {iface}  rx {}  tx {}  err {}/{}",
                            format_rate(rates.recv_per_sec),
                            format_rate(rates.sent_per_sec),
                            rates.errin,
                            rates.errout,
                        ),
                    ));
                }
            }
            None => out.push((
                RegionId::Interface(String::new()),
                format!("net   {UNAVAILABLE}"),
            )),
        }
    }

    if input.categories.contains(&Category::Disks) {
        match &input.snapshot.disks {
            Some(mounts) => {
                for mount in mounts {
                    out.push((
                        RegionId::Mount(mount.mount_point.clone()),
                        format!(
                            "disk  {}  {} {}  {} {:5.1}% of {}",
                            mount.mount_point,
                            mount.device,
                            mount.fstype,
                            percent_bar(mount.percent, BAR_WIDTH),
                            mount.percent,
                            format_bytes(mount.total_bytes),
                        ),
                    ));
                }
            }
            None => out.push((
                RegionId::Mount(String::new()),
                format!("disk  {UNAVAILABLE}"),
            )),
        }
    }

    if input.categories.contains(&Category::Processes) {
        let Some(records) = input.records else {
            out.push((RegionId::ProcessHeader, format!("proc  {UNAVAILABLE}")));
            return out;
        };
        out.push((
            RegionId::ProcessHeader,
            format!(
                "{:>7} {:<10} {:>6} {:>7} {:>6} {:>7} {:>9}  {}",
                "PID", "USER", "CPU%", "AVGCPU", "MEM%", "AVGMEM", "CPUTIME", "COMMAND"
            ),
        ));

        // Hottest rows first; the cap bounds the display, not the tracking.
        let mut rows: Vec<&ProcessRecord> = records.values().collect();
        rows.sort_by(|a, b| {
            b.cpu_percent
                .partial_cmp(&a.cpu_percent)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.pid.cmp(&b.pid))
        });
        for record in rows.into_iter().take(input.max_rows) {
            out.push((RegionId::ProcessRow(record.pid), process_row(record, input.averages)));
            if input.show_open_files {
                for (i, path) in record.open_files.iter().take(MAX_FILE_LINES).enumerate() {
                    out.push((RegionId::OpenFile(record.pid, i), format!("         {path}")));
                }
                let hidden = record.open_files.len().saturating_sub(MAX_FILE_LINES);
                if hidden > 0 {
                    out.push((
                        RegionId::OpenFile(record.pid, MAX_FILE_LINES),
                        format!("         … {hidden} more open files"),
                    ));
                }
            }
        }
    }

    out
}

fn process_row(record: &ProcessRecord, averages: &AvgStore) -> String {
    let (avg_cpu, avg_mem) = match averages.process_avg(record.pid) {
        Some((c, m)) => (format!("{c:6.1}"), format!("{m:6.1}")),
        None => (format!("{UNAVAILABLE:>6}"), format!("{UNAVAILABLE:>6}")),
    };
    let secs = record.cumulative_time.as_secs();
    format!(
        "{:>7} {:<10} {:>6.1} {:>7} {:>6.1} {:>7} {:>7}:{:02}  {}",
        record.pid,
        truncate_unicode(&record.user, 10),
        record.cpu_percent,
        avg_cpu.trim_start(),
        record.mem_percent,
        avg_mem.trim_start(),
        secs / 60,
        secs % 60,
        truncate_unicode(&record.command, COMMAND_WIDTH),
    )
}

fn avg_label(avg: Option<f32>) -> String {
    match avg {
        Some(v) => format!("avg {v:5.1}%"),
        None => format!("avg {UNAVAILABLE}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::snapshot::{CpuSample, MemorySample};
    use std::collections::BTreeMap;

    fn base_input<'a>(
        snapshot: &'a Snapshot,
        records: &'a BTreeMap<u32, ProcessRecord>,
        rates: &'a BTreeMap<String, NetRates>,
        averages: &'a AvgStore,
        categories: &'a HashSet<Category>,
    ) -> FrameInput<'a> {
        FrameInput {
            snapshot,
            records: Some(records),
            rates,
            averages,
            categories,
            max_rows: 15,
            show_open_files: false,
        }
    }

    #[test]
    fn failed_category_renders_unavailable_marker() {
        let snapshot = Snapshot::empty();
        let records = BTreeMap::new();
        let rates = BTreeMap::new();
        let averages = AvgStore::default();
        let categories = HashSet::from([Category::Cpu, Category::Memory]);

        let regions = build_regions(&base_input(
            &snapshot, &records, &rates, &averages, &categories,
        ));
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|(_, text)| text.contains(UNAVAILABLE)));
    }

    #[test]
    fn unselected_categories_are_omitted() {
        let mut snapshot = Snapshot::empty();
        snapshot.cpu = Some(CpuSample {
            overall: 10.0,
            per_core: vec![10.0, 10.0],
        });
        snapshot.memory = Some(MemorySample {
            percent: 50.0,
            used_bytes: 1 << 30,
            total_bytes: 2 << 30,
        });
        let records = BTreeMap::new();
        let rates = BTreeMap::new();
        let averages = AvgStore::default();
        let categories = HashSet::from([Category::Cpu]);

        let regions = build_regions(&base_input(
            &snapshot, &records, &rates, &averages, &categories,
        ));
        // overall + two cores, no memory region
        assert_eq!(regions.len(), 3);
        assert!(regions.iter().all(|(id, _)| *id != RegionId::Memory));
    }

    #[test]
    fn host_lines_end_with_separator() {
        let host = HostInfo {
            hostname: "box".into(),
            interfaces: BTreeMap::from([(
                "eth0".to_string(),
                ("10.0.0.2".to_string(), "aa:bb:cc:dd:ee:ff".to_string()),
            )]),
            ..HostInfo::default()
        };
        let lines = host_lines(&host);
        assert!(lines[0].starts_with("box"));
        assert!(lines.iter().any(|l| l.contains("eth0")));
        assert_eq!(lines.last().map(String::as_str), Some(""));
    }
}
