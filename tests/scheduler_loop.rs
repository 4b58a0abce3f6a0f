use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::io;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use tokio::sync::mpsc;

use statpoll::error::{Error, Result};
use statpoll::event::{Event, EventHandler};
use statpoll::metrics::snapshot::{
    CpuSample, HostInfo, MemorySample, MountUsage, NetCounters, ProcessRow,
};
use statpoll::metrics::{Category, MetricSource};
use statpoll::poll::{PollScheduler, TraceSpec};
use statpoll::screen::{ScreenWriter, TermOut};
use statpoll::stats::PidStats;

#[derive(Default)]
struct FakeOut {
    writes: Vec<(u16, String)>,
    fail: bool,
}

impl TermOut for FakeOut {
    fn write_line(&mut self, row: u16, text: &str) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "detached"));
        }
        self.writes.push((row, text.to_string()));
        Ok(())
    }
    fn clear_line(&mut self, _row: u16) -> io::Result<()> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "detached"));
        }
        Ok(())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Scripted source: serves one process table per tick (the last one
/// repeats), with optional per-category failures.
struct FakeSource {
    tables: VecDeque<Vec<ProcessRow>>,
    current: Vec<ProcessRow>,
    matches: BTreeSet<u32>,
    fail_disks: bool,
}

impl FakeSource {
    fn new(tables: Vec<Vec<ProcessRow>>) -> Self {
        FakeSource {
            tables: tables.into(),
            current: Vec::new(),
            matches: BTreeSet::new(),
            fail_disks: false,
        }
    }
}

fn row(pid: u32, cpu: f32) -> ProcessRow {
    ProcessRow {
        pid,
        user: "1000".to_string(),
        command: format!("proc-{pid}"),
        cpu_percent: cpu,
        mem_percent: 1.0,
        start_time: 1_700_000_000,
        cpu_time_ms: 500,
    }
}

impl MetricSource for FakeSource {
    fn host_info(&self) -> HostInfo {
        HostInfo::default()
    }
    fn cpu(&mut self) -> Result<CpuSample> {
        Ok(CpuSample {
            overall: 25.0,
            per_core: vec![25.0],
        })
    }
    fn memory(&mut self) -> Result<MemorySample> {
        Ok(MemorySample {
            percent: 40.0,
            used_bytes: 0,
            total_bytes: 0,
        })
    }
    fn network_counters(&mut self) -> Result<BTreeMap<String, NetCounters>> {
        Ok(BTreeMap::new())
    }
    fn disk_usage(&mut self) -> Result<Vec<MountUsage>> {
        if self.fail_disks {
            return Err(Error::collection(Category::Disks, "mount unreadable"));
        }
        Ok(vec![MountUsage {
            device: "sda1".to_string(),
            fstype: "ext4".to_string(),
            mount_point: "/".to_string(),
            total_bytes: 1 << 40,
            percent: 42.0,
        }])
    }
    fn process_table(&mut self) -> Result<Vec<ProcessRow>> {
        if let Some(next) = self.tables.pop_front() {
            self.current = next;
        }
        Ok(self.current.clone())
    }
    fn find_pids(&self, _pattern: &str, _case_sensitive: bool) -> BTreeSet<u32> {
        self.matches.clone()
    }
    fn open_files_for(&self, pids: &BTreeSet<u32>) -> BTreeMap<u32, Vec<String>> {
        pids.iter()
            .map(|&pid| (pid, vec![format!("/tmp/{pid}.log"), "socket:[1]".to_string()]))
            .collect()
    }
}

fn all_categories() -> HashSet<Category> {
    Category::ALL.into_iter().collect()
}

#[test]
fn failed_category_renders_unavailable_and_loop_continues() {
    let mut scheduler = PollScheduler::new(1, all_categories()).unwrap();
    let mut source = FakeSource::new(vec![vec![row(1, 1.0)]]);
    source.fail_disks = true;
    let mut stats = PidStats::all();
    let mut screen = ScreenWriter::new(FakeOut::default());

    scheduler.tick(&mut source, &mut stats, &mut screen).unwrap();
    let disk_line = screen
        .out_ref()
        .writes
        .iter()
        .find(|(_, text)| text.starts_with("disk"))
        .expect("disk region missing");
    assert!(disk_line.1.contains('\u{2014}'));

    // The mount comes back on the next tick and the loop carried on.
    source.fail_disks = false;
    scheduler.tick(&mut source, &mut stats, &mut screen).unwrap();
    assert!(
        screen
            .out_ref()
            .writes
            .iter()
            .any(|(_, text)| text.contains("ext4"))
    );
}

#[test]
fn traced_pid_lifecycle_follows_the_table() {
    let mut scheduler = PollScheduler::new(1, all_categories())
        .unwrap()
        .with_trace(Some(TraceSpec {
            pattern: "proc".to_string(),
            case_sensitive: true,
        }));
    let mut source = FakeSource::new(vec![
        vec![row(100, 1.0), row(101, 1.0)],
        vec![row(100, 2.0)],
    ]);
    source.matches = BTreeSet::from([100, 101]);
    let mut stats = PidStats::explicit();
    let mut screen = ScreenWriter::new(FakeOut::default());

    scheduler.tick(&mut source, &mut stats, &mut screen).unwrap();
    assert_eq!(
        stats.records().keys().copied().collect::<Vec<_>>(),
        vec![100, 101]
    );

    // PID 101 exits: gone from the records and the tracked set.
    source.matches = BTreeSet::from([100]);
    scheduler.tick(&mut source, &mut stats, &mut screen).unwrap();
    assert_eq!(stats.records().keys().copied().collect::<Vec<_>>(), vec![100]);
    assert_eq!(stats.tracked_pids(), BTreeSet::from([100]));
}

#[test]
fn traced_processes_get_lossy_filtered_open_files() {
    let mut scheduler = PollScheduler::new(1, all_categories())
        .unwrap()
        .with_trace(Some(TraceSpec {
            pattern: "proc".to_string(),
            case_sensitive: true,
        }));
    let mut source = FakeSource::new(vec![vec![row(100, 1.0)]]);
    source.matches = BTreeSet::from([100]);
    let mut stats = PidStats::explicit();
    let mut screen = ScreenWriter::new(FakeOut::default());

    scheduler.tick(&mut source, &mut stats, &mut screen).unwrap();
    assert_eq!(
        stats.records()[&100].open_files,
        BTreeSet::from(["/tmp/100.log".to_string()]),
        "socket descriptor should have been filtered out"
    );
    assert!(
        screen
            .out_ref()
            .writes
            .iter()
            .any(|(_, text)| text.contains("/tmp/100.log"))
    );
}

#[tokio::test]
async fn quit_key_ends_the_loop_promptly() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut events = EventHandler::scripted(rx);

    tx.send(Event::Tick).unwrap();
    tx.send(Event::Key(KeyEvent {
        code: KeyCode::Char('q'),
        modifiers: KeyModifiers::NONE,
        kind: KeyEventKind::Press,
        state: KeyEventState::NONE,
    }))
    .unwrap();

    let mut scheduler = PollScheduler::new(1, all_categories()).unwrap();
    let mut source = FakeSource::new(vec![vec![row(1, 1.0)]]);
    let mut stats = PidStats::all();
    let mut screen = ScreenWriter::new(FakeOut::default());

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        scheduler.run(&mut events, &mut source, &mut stats, &mut screen),
    )
    .await;
    assert!(matches!(outcome, Ok(Ok(()))), "loop did not exit on quit key");
    assert!(!screen.out_ref().writes.is_empty(), "tick before quit rendered");
}

#[tokio::test]
async fn persistent_render_failure_shuts_the_loop_down() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut events = EventHandler::scripted(rx);
    for _ in 0..4 {
        tx.send(Event::Tick).unwrap();
    }

    let mut scheduler = PollScheduler::new(1, all_categories()).unwrap();
    let mut source = FakeSource::new(vec![vec![row(1, 1.0)]]);
    let mut stats = PidStats::all();
    let mut screen = ScreenWriter::new(FakeOut {
        fail: true,
        ..FakeOut::default()
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        scheduler.run(&mut events, &mut source, &mut stats, &mut screen),
    )
    .await
    .expect("loop hung instead of escalating");
    assert!(matches!(outcome, Err(Error::Render(_))));
}
