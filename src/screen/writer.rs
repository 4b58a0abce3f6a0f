use std::collections::HashMap;
use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::Print;
use crossterm::terminal::{Clear, ClearType};
use tracing::{debug, warn};

use super::render::{self, FrameInput, RegionId};
use crate::error::{Error, Result};
use crate::metrics::HostInfo;

/// Consecutive failed ticks tolerated before the writer gives up.
const RENDER_RETRY_BUDGET: u32 = 3;

/// Row-addressed terminal output. Production uses crossterm; tests count
/// writes against scripted frames.
pub trait TermOut {
    fn write_line(&mut self, row: u16, text: &str) -> io::Result<()>;
    fn clear_line(&mut self, row: u16) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

pub struct CrosstermOut<W: Write> {
    out: W,
}

impl<W: Write> CrosstermOut<W> {
    pub fn new(out: W) -> Self {
        CrosstermOut { out }
    }
}

impl<W: Write> TermOut for CrosstermOut<W> {
    fn write_line(&mut self, row: u16, text: &str) -> io::Result<()> {
        queue!(
            self.out,
            MoveTo(0, row),
            Clear(ClearType::CurrentLine),
            Print(text)
        )
    }

    fn clear_line(&mut self, row: u16) -> io::Result<()> {
        queue!(self.out, MoveTo(0, row), Clear(ClearType::CurrentLine))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Owns the rendered terminal state. Diffs each tick's regions against the
/// last-drawn frame and issues the minimal set of row writes.
///
/// Invariant: `frame` records a region only after its write was issued, so
/// it always mirrors what is actually visible.
pub struct ScreenWriter<T: TermOut> {
    out: T,
    frame: HashMap<RegionId, (u16, String)>,
    /// Header lines drawn at init; kept for full redraws after a resize.
    static_lines: Vec<String>,
    /// Rows occupied by the static header; dynamic regions start below it.
    static_rows: u16,
    /// One past the last row drawn on the previous tick.
    prev_end: u16,
    consecutive_failures: u32,
}

impl<T: TermOut> ScreenWriter<T> {
    pub fn new(out: T) -> Self {
        ScreenWriter {
            out,
            frame: HashMap::new(),
            static_lines: Vec::new(),
            static_rows: 0,
            prev_end: 0,
            consecutive_failures: 0,
        }
    }

    /// Draw the static host header once. Not part of the diffed frame.
    pub fn init(&mut self, host: &HostInfo) -> Result<()> {
        self.static_lines = render::host_lines(host);
        self.draw_static()?;
        self.static_rows = self.static_lines.len() as u16;
        self.prev_end = self.static_rows;
        self.out.flush().map_err(Error::Render)?;
        Ok(())
    }

    fn draw_static(&mut self) -> Result<()> {
        let ScreenWriter {
            out, static_lines, ..
        } = self;
        for (i, line) in static_lines.iter().enumerate() {
            out.write_line(i as u16, line).map_err(Error::Render)?;
        }
        Ok(())
    }

    pub fn out_ref(&self) -> &T {
        &self.out
    }

    /// Forget the drawn frame so the next update repaints everything.
    /// Called after a terminal resize.
    pub fn invalidate(&mut self) {
        self.frame.clear();
        let _ = self.draw_static();
    }

    /// Render one tick. Only regions whose text or row changed are written;
    /// rows left over from a taller previous frame are cleared.
    pub fn update(&mut self, input: &FrameInput<'_>) -> Result<()> {
        let regions = render::build_regions(input);
        let mut tick_error: Option<io::Error> = None;
        let mut writes = 0usize;

        for (i, (id, text)) in regions.iter().enumerate() {
            let row = self.static_rows + i as u16;
            let unchanged = self
                .frame
                .get(id)
                .is_some_and(|(prev_row, prev_text)| *prev_row == row && prev_text == text);
            if unchanged {
                continue;
            }
            match self.out.write_line(row, text) {
                Ok(()) => {
                    self.frame.insert(id.clone(), (row, text.clone()));
                    writes += 1;
                }
                Err(e) => {
                    warn!(row, error = %e, "terminal write failed");
                    tick_error = Some(e);
                }
            }
        }

        // Drop regions that vanished this tick and blank their leftover rows.
        let new_end = self.static_rows + regions.len() as u16;
        let keep: HashMap<&RegionId, ()> = regions.iter().map(|(id, _)| (id, ())).collect();
        self.frame.retain(|id, _| keep.contains_key(id));
        for row in new_end..self.prev_end {
            if let Err(e) = self.out.clear_line(row) {
                warn!(row, error = %e, "terminal clear failed");
                tick_error = Some(e);
            }
        }
        self.prev_end = new_end;

        if let Err(e) = self.out.flush() {
            tick_error = Some(e);
        }

        match tick_error {
            Some(e) => {
                self.consecutive_failures += 1;
                debug!(
                    failures = self.consecutive_failures,
                    budget = RENDER_RETRY_BUDGET,
                    "render tick failed"
                );
                if self.consecutive_failures >= RENDER_RETRY_BUDGET {
                    return Err(Error::Render(e));
                }
                Ok(())
            }
            None => {
                self.consecutive_failures = 0;
                debug!(writes, regions = regions.len(), "render tick complete");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test double that records every row write and can be told to fail.
    pub struct CountingOut {
        pub writes: Vec<(u16, String)>,
        pub clears: Vec<u16>,
        pub fail: bool,
    }

    impl CountingOut {
        pub fn new() -> Self {
            CountingOut {
                writes: Vec::new(),
                clears: Vec::new(),
                fail: false,
            }
        }
    }

    impl TermOut for CountingOut {
        fn write_line(&mut self, row: u16, text: &str) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "detached"));
            }
            self.writes.push((row, text.to_string()));
            Ok(())
        }

        fn clear_line(&mut self, row: u16) -> io::Result<()> {
            if self.fail {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "detached"));
            }
            self.clears.push(row);
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    use crate::history::AvgStore;
    use crate::metrics::snapshot::{CpuSample, Snapshot};
    use crate::metrics::Category;
    use std::collections::{BTreeMap, HashSet};

    fn cpu_snapshot(overall: f32) -> Snapshot {
        let mut s = Snapshot::empty();
        s.cpu = Some(CpuSample {
            overall,
            per_core: vec![],
        });
        s
    }

    #[test]
    fn unchanged_region_is_not_rewritten() {
        let mut writer = ScreenWriter::new(CountingOut::new());
        let records = BTreeMap::new();
        let rates = BTreeMap::new();
        let averages = AvgStore::new(4);
        let categories = HashSet::from([Category::Cpu]);
        let snapshot = cpu_snapshot(10.0);

        let input = FrameInput {
            snapshot: &snapshot,
            records: Some(&records),
            rates: &rates,
            averages: &averages,
            categories: &categories,
            max_rows: 15,
            show_open_files: false,
        };
        writer.update(&input).unwrap();
        let first = writer.out.writes.len();
        assert_eq!(first, 1);

        writer.update(&input).unwrap();
        assert_eq!(writer.out.writes.len(), first, "identical tick wrote again");
    }

    #[test]
    fn render_failures_escalate_after_budget() {
        let mut writer = ScreenWriter::new(CountingOut::new());
        let records = BTreeMap::new();
        let rates = BTreeMap::new();
        let averages = AvgStore::new(4);
        let categories = HashSet::from([Category::Cpu]);

        writer.out.fail = true;
        for tick in 0..RENDER_RETRY_BUDGET {
            let snapshot = cpu_snapshot(tick as f32);
            let input = FrameInput {
                snapshot: &snapshot,
                records: Some(&records),
                rates: &rates,
                averages: &averages,
                categories: &categories,
                max_rows: 15,
                show_open_files: false,
            };
            let result = writer.update(&input);
            if tick + 1 < RENDER_RETRY_BUDGET {
                assert!(result.is_ok(), "failure escalated before budget");
            } else {
                assert!(matches!(result, Err(Error::Render(_))));
            }
        }
    }

    #[test]
    fn success_resets_the_failure_counter() {
        let mut writer = ScreenWriter::new(CountingOut::new());
        let records = BTreeMap::new();
        let rates = BTreeMap::new();
        let averages = AvgStore::new(4);
        let categories = HashSet::from([Category::Cpu]);

        for tick in 0..6 {
            writer.out.fail = tick % 2 == 0;
            let snapshot = cpu_snapshot(tick as f32);
            let input = FrameInput {
                snapshot: &snapshot,
                records: Some(&records),
                rates: &rates,
                averages: &averages,
                categories: &categories,
                max_rows: 15,
                show_open_files: false,
            };
            assert!(writer.update(&input).is_ok(), "alternating failures escalated");
        }
    }
}
