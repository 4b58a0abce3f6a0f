use std::collections::{BTreeMap, HashSet};
use std::io;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, debug_span, info, warn};

use crate::error::{Error, Result};
use crate::event::{Event, EventHandler};
use crate::history::{AvgStore, RateTracker};
use crate::metrics::snapshot::ProcessRow;
use crate::metrics::{Category, MetricSource, Snapshot};
use crate::screen::{FrameInput, ScreenWriter, TermOut};
use crate::stats::PidStats;

/// Process-search spec behind `--trace`.
#[derive(Debug, Clone)]
pub struct TraceSpec {
    pub pattern: String,
    pub case_sensitive: bool,
}

/// Drives the fixed-interval tick loop: collects the configured categories,
/// refreshes tracked processes, and hands each tick's bundle to the screen.
///
/// Holds no metric state beyond the category set and the rate/average
/// bookkeeping the display needs; tracked PIDs live in `PidStats`.
pub struct PollScheduler {
    interval_secs: u64,
    categories: HashSet<Category>,
    trace: Option<TraceSpec>,
    open_files_every: u64,
    max_rows: usize,
    rates: RateTracker,
    averages: AvgStore,
    tick_count: u64,
}

impl PollScheduler {
    pub fn new(interval_secs: u64, categories: HashSet<Category>) -> Result<Self> {
        if interval_secs == 0 {
            return Err(Error::config("poll interval must be at least 1 second"));
        }
        Ok(PollScheduler {
            interval_secs,
            categories,
            trace: None,
            open_files_every: 5,
            max_rows: 15,
            rates: RateTracker::new(),
            averages: AvgStore::default(),
            tick_count: 0,
        })
    }

    pub fn with_trace(mut self, trace: Option<TraceSpec>) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_open_files_every(mut self, every: u64) -> Self {
        self.open_files_every = every.max(1);
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_average_window(mut self, window: usize) -> Self {
        self.averages = AvgStore::new(window.max(1));
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Run until the user quits or a render failure escalates. Ticks are
    /// strictly sequential: the next tick is not consumed until this tick's
    /// render returned.
    pub async fn run<S: MetricSource, T: TermOut>(
        &mut self,
        events: &mut EventHandler,
        source: &mut S,
        stats: &mut PidStats,
        screen: &mut ScreenWriter<T>,
    ) -> Result<()> {
        loop {
            let Some(event) = events.next().await else {
                // The event task only dies if terminal input went away.
                return Err(Error::Io(io::Error::other("event stream ended")));
            };
            match event {
                Event::Key(key) if is_quit(&key) => {
                    info!("interrupt received, shutting down");
                    return Ok(());
                }
                Event::Key(_) => {}
                Event::Resize => screen.invalidate(),
                Event::Tick => self.tick(source, stats, screen)?,
            }
        }
    }

    /// One tick: collect, refresh, render.
    pub fn tick<S: MetricSource, T: TermOut>(
        &mut self,
        source: &mut S,
        stats: &mut PidStats,
        screen: &mut ScreenWriter<T>,
    ) -> Result<()> {
        self.tick_count += 1;
        let span = debug_span!("tick", n = self.tick_count).entered();

        let (snapshot, table) = self.collect(source);
        let rates = match &snapshot.network {
            Some(counters) => self.rates.update(counters, self.interval_secs),
            None => BTreeMap::new(),
        };

        let table_ok = table.is_some();
        if let Some(table) = &table {
            if let Some(trace) = &self.trace {
                // Re-resolve every tick so newly started matches get tracked.
                let matches = source.find_pids(&trace.pattern, trace.case_sensitive);
                stats.track(matches);
            }
            stats.refresh(table);
        }

        if self.trace.is_some() && (self.tick_count - 1) % self.open_files_every == 0 {
            let pids = stats.tracked_pids();
            let _files_span = debug_span!("tick.open_files", pids = pids.len()).entered();
            stats.open_files(source, &pids);
        }

        self.averages.record_system(
            snapshot.cpu.as_ref().map(|c| c.overall),
            snapshot.memory.as_ref().map(|m| m.percent),
        );
        if table_ok {
            for record in stats.records().values() {
                self.averages
                    .record_process(record.pid, record.cpu_percent, record.mem_percent);
            }
            let alive = stats.records().keys().copied().collect();
            self.averages.gc(&alive);
        }

        let input = FrameInput {
            snapshot: &snapshot,
            records: table_ok.then(|| stats.records()),
            rates: &rates,
            averages: &self.averages,
            categories: &self.categories,
            max_rows: self.max_rows,
            show_open_files: self.trace.is_some(),
        };
        screen.update(&input)?;
        drop(span);
        Ok(())
    }

    /// Sample every configured category, recovering per category: a failed
    /// read logs a warning and leaves that category unset for the tick.
    pub fn collect<S: MetricSource>(
        &mut self,
        source: &mut S,
    ) -> (Snapshot, Option<Vec<ProcessRow>>) {
        let mut snapshot = Snapshot::empty();

        if self.categories.contains(&Category::Cpu) {
            snapshot.cpu = self.sample(Category::Cpu, || source.cpu());
        }
        if self.categories.contains(&Category::Memory) {
            snapshot.memory = self.sample(Category::Memory, || source.memory());
        }
        if self.categories.contains(&Category::Network) {
            snapshot.network = self.sample(Category::Network, || source.network_counters());
        }
        if self.categories.contains(&Category::Disks) {
            snapshot.disks = self.sample(Category::Disks, || source.disk_usage());
        }

        let table = if self.categories.contains(&Category::Processes) {
            self.sample(Category::Processes, || source.process_table())
        } else {
            None
        };

        (snapshot, table)
    }

    fn sample<V>(&self, category: Category, read: impl FnOnce() -> Result<V>) -> Option<V> {
        let span = debug_span!("tick.sample", category = %category).entered();
        let started = std::time::Instant::now();
        let result = read();
        debug!(
            category = %category,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "category sampled"
        );
        drop(span);
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(category = %category, error = %e, "collection failed, rendering unavailable");
                None
            }
        }
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    if key.kind != KeyEventKind::Press {
        return false;
    }
    matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}
