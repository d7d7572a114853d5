//! Shared transfer progress, updated from every worker

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};
use tracing::info;

/// Progress of one logical transfer (one archive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub name: String,
    pub transferred: u64,
    pub total_size: u64,
    pub completed: bool,
}

struct StatsState {
    records: BTreeMap<String, ProgressRecord>,
    bytes_sent: u64,
    last_report: Instant,
}

/// Lock-guarded progress aggregate handed by reference to every transfer task.
pub struct StatsAggregator {
    interval: Duration,
    total_files: usize,
    total_size: u64,
    started: Instant,
    state: Mutex<StatsState>,
}

impl StatsAggregator {
    pub fn new(interval: Duration, total_files: usize, total_size: u64) -> Self {
        let now = Instant::now();
        Self {
            interval,
            total_files,
            total_size,
            started: now,
            state: Mutex::new(StatsState {
                records: BTreeMap::new(),
                bytes_sent: 0,
                last_report: now,
            }),
        }
    }

    /// Account `delta` more bytes for `name`, whose full size is `total_size`.
    ///
    /// Emits a report when the interval has elapsed since the previous one, so
    /// the cadence depends on how often this is called.
    pub fn update(&self, name: &str, delta: u64, total_size: u64) {
        let mut state = self.state.lock();
        let record = state
            .records
            .entry(name.to_string())
            .or_insert_with(|| ProgressRecord {
                name: name.to_string(),
                transferred: 0,
                total_size,
                completed: false,
            });
        record.transferred += delta;
        record.completed = record.transferred == record.total_size;
        state.bytes_sent += delta;

        if state.last_report.elapsed() >= self.interval {
            state.last_report = Instant::now();
            info!("{}", self.format(&state));
        }
    }

    /// Log the current report.
    pub fn report(&self) {
        info!("{}", self.summary());
    }

    /// Current report text.
    pub fn summary(&self) -> String {
        let state = self.state.lock();
        self.format(&state)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.state.lock().bytes_sent
    }

    pub fn record(&self, name: &str) -> Option<ProgressRecord> {
        self.state.lock().records.get(name).cloned()
    }

    fn format(&self, state: &StatsState) -> String {
        let elapsed = self.started.elapsed().as_secs_f64();
        let completed = state.records.values().filter(|r| r.completed).count();
        let rate = if elapsed > 0.0 { state.bytes_sent as f64 / elapsed } else { 0.0 };

        let mut out = String::from("--- stats ---\n");
        let _ = writeln!(out, "Elapsed time: {elapsed:.1} seconds");
        let _ = writeln!(
            out,
            "Data sent: {} of {} ({}%)",
            human_bytes(state.bytes_sent as f64),
            human_bytes(self.total_size as f64),
            percent(state.bytes_sent, self.total_size)
        );
        let _ = writeln!(out, "Data processing rate: {}/s", human_bytes(rate));
        let _ = write!(
            out,
            "Files completed: {} of {} ({}%)",
            completed,
            self.total_files,
            percent(completed as u64, self.total_files as u64)
        );

        let in_flight: Vec<&ProgressRecord> =
            state.records.values().filter(|r| !r.completed).collect();
        if !in_flight.is_empty() {
            out.push_str("\nFiles in progress:");
            for r in in_flight {
                let _ = write!(out, "\n - {} ({}%)", r.name, percent(r.transferred, r.total_size));
            }
        }
        out
    }
}

/// Binary-scaled size with one decimal, e.g. `1.5 MiB`.
pub fn human_bytes(mut value: f64) -> String {
    for unit in ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"] {
        if value.abs() < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} ZiB")
}

/// Percentage rounded to one decimal; 0 when `total` is 0.
pub fn percent(value: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (value as f64 / total as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_updates_are_accounted_exactly() {
        let stats = Arc::new(StatsAggregator::new(Duration::from_millis(1), 8, 8 * 1000));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stats = stats.clone();
                thread::spawn(move || {
                    let name = format!("part-{i}");
                    // Part 7 stops short of its declared size.
                    let chunks = if i == 7 { 99 } else { 100 };
                    for _ in 0..chunks {
                        stats.update(&name, 10, 1000);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stats.bytes_sent(), 7 * 1000 + 990);
        for i in 0..7 {
            let rec = stats.record(&format!("part-{i}")).unwrap();
            assert_eq!(rec.transferred, 1000);
            assert!(rec.completed);
        }
        let partial = stats.record("part-7").unwrap();
        assert_eq!(partial.transferred, 990);
        assert!(!partial.completed);
    }

    #[test]
    fn summary_lists_only_incomplete_files() {
        let stats = StatsAggregator::new(Duration::from_secs(3600), 2, 200);
        stats.update("done.tar", 100, 100);
        stats.update("half.tar", 50, 100);
        let text = stats.summary();
        assert!(text.contains("Files completed: 1 of 2 (50%)"));
        assert!(text.contains(" - half.tar (50%)"));
        assert!(!text.contains(" - done.tar"));
        assert!(text.contains("Data sent: 150.0 B of 200.0 B (75%)"));
    }

    #[test]
    fn human_bytes_scales_binary_units() {
        assert_eq!(human_bytes(0.0), "0.0 B");
        assert_eq!(human_bytes(1536.0), "1.5 KiB");
        assert_eq!(human_bytes(5.0 * 1024.0 * 1024.0), "5.0 MiB");
    }

    #[test]
    fn percent_handles_zero_total() {
        assert_eq!(percent(5, 0), 0.0);
        assert_eq!(percent(1, 3), 33.3);
    }
}
