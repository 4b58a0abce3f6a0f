use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::metrics::NetCounters;

const DEFAULT_WINDOW: usize = 60;

/// Fixed-capacity rolling window of samples.
#[derive(Debug, Clone)]
pub struct Rolling {
    values: VecDeque<f32>,
    capacity: usize,
}

impl Rolling {
    fn new(capacity: usize) -> Self {
        Rolling {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn mean(&self) -> Option<f32> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f32>() / self.values.len() as f32)
    }
}

/// Simple moving averages over the last K ticks: overall CPU%, memory%,
/// and per-tracked-PID CPU%/MEM%.
#[derive(Debug)]
pub struct AvgStore {
    window: usize,
    cpu: Rolling,
    memory: Rolling,
    per_pid: HashMap<u32, (Rolling, Rolling)>,
    gc_counter: u32,
}

impl AvgStore {
    pub fn new(window: usize) -> Self {
        AvgStore {
            window,
            cpu: Rolling::new(window),
            memory: Rolling::new(window),
            per_pid: HashMap::new(),
            gc_counter: 0,
        }
    }

    pub fn record_system(&mut self, cpu: Option<f32>, memory: Option<f32>) {
        if let Some(v) = cpu {
            self.cpu.push(v);
        }
        if let Some(v) = memory {
            self.memory.push(v);
        }
    }

    pub fn record_process(&mut self, pid: u32, cpu: f32, memory: f32) {
        let window = self.window;
        let entry = self
            .per_pid
            .entry(pid)
            .or_insert_with(|| (Rolling::new(window), Rolling::new(window)));
        entry.0.push(cpu);
        entry.1.push(memory);
    }

    pub fn cpu_avg(&self) -> Option<f32> {
        self.cpu.mean()
    }

    pub fn memory_avg(&self) -> Option<f32> {
        self.memory.mean()
    }

    pub fn process_avg(&self, pid: u32) -> Option<(f32, f32)> {
        let (cpu, mem) = self.per_pid.get(&pid)?;
        Some((cpu.mean()?, mem.mean()?))
    }

    /// Drop series for PIDs that are no longer alive. Runs every 10th call
    /// to avoid rescanning the map each tick.
    pub fn gc(&mut self, alive: &HashSet<u32>) {
        self.gc_counter += 1;
        if !self.gc_counter.is_multiple_of(10) {
            return;
        }
        self.per_pid.retain(|pid, _| alive.contains(pid));
    }
}

impl Default for AvgStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// Per-interface throughput derived from successive counter reads. `None`
/// means no rate can be derived yet (first observation, or a counter that
/// went backwards after an interface reset).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetRates {
    pub sent_per_sec: Option<f64>,
    pub recv_per_sec: Option<f64>,
    pub errin: u64,
    pub errout: u64,
}

#[derive(Debug, Default)]
pub struct RateTracker {
    prev: BTreeMap<String, NetCounters>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(
        &mut self,
        current: &BTreeMap<String, NetCounters>,
        interval_secs: u64,
    ) -> BTreeMap<String, NetRates> {
        let mut out = BTreeMap::new();
        for (iface, counters) in current {
            let rates = match self.prev.get(iface) {
                Some(prev) if interval_secs > 0 => NetRates {
                    sent_per_sec: rate(prev.bytes_sent, counters.bytes_sent, interval_secs),
                    recv_per_sec: rate(prev.bytes_recv, counters.bytes_recv, interval_secs),
                    errin: counters.errin,
                    errout: counters.errout,
                },
                _ => NetRates {
                    sent_per_sec: None,
                    recv_per_sec: None,
                    errin: counters.errin,
                    errout: counters.errout,
                },
            };
            out.insert(iface.clone(), rates);
        }
        self.prev = current.clone();
        out
    }
}

fn rate(prev: u64, current: u64, interval_secs: u64) -> Option<f64> {
    if current < prev {
        return None;
    }
    Some((current - prev) as f64 / interval_secs as f64)
}
