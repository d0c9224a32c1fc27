//! Rate-limited progress reporting for long catch-ups.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Progress tracker for long-running operations.
///
/// Logs the processed count, rate and (when the total is known) percentage
/// at most once per report interval.
///
/// # Example
///
/// ```
/// use ledgersync_ledger::ProgressTracker;
/// use std::time::Duration;
///
/// let tracker = ProgressTracker::with_total("full import", 1000)
///     .with_report_interval(Duration::from_secs(5));
///
/// for _ in 0..1000 {
///     tracker.inc();
/// }
/// tracker.complete();
/// ```
#[derive(Debug)]
pub struct ProgressTracker {
    name: String,
    total: Option<u64>,
    state: Mutex<ProgressState>,
    start_time: Instant,
    report_interval: Duration,
}

#[derive(Debug)]
struct ProgressState {
    processed: u64,
    last_report: Instant,
}

impl ProgressTracker {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            total: None,
            state: Mutex::new(ProgressState {
                processed: 0,
                last_report: now,
            }),
            start_time: now,
            report_interval: Duration::from_secs(5),
        }
    }

    pub fn with_total(name: impl Into<String>, total: u64) -> Self {
        let mut tracker = Self::new(name);
        tracker.total = Some(total);
        tracker
    }

    /// Like [`with_total`](Self::with_total) when the total may be unknown.
    pub fn with_optional_total(name: impl Into<String>, total: Option<u64>) -> Self {
        let mut tracker = Self::new(name);
        tracker.total = total;
        tracker
    }

    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        let mut state = self.state.lock();
        state.processed += n;
        let now = Instant::now();
        if now.duration_since(state.last_report) < self.report_interval {
            return;
        }
        state.last_report = now;
        let processed = state.processed;
        drop(state);
        self.report(processed);
    }

    pub fn processed(&self) -> u64 {
        self.state.lock().processed
    }

    /// Logs the final count and elapsed time.
    pub fn complete(&self) {
        let processed = self.processed();
        let elapsed = self.start_time.elapsed();
        tracing::info!(
            name = %self.name,
            processed,
            total = ?self.total,
            elapsed_secs = elapsed.as_secs_f64(),
            "Operation completed"
        );
    }

    fn report(&self, processed: u64) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            processed as f64 / elapsed
        } else {
            0.0
        };

        match self.total {
            Some(total) if total > 0 => {
                let percent = (processed as f64 / total as f64) * 100.0;
                tracing::info!(
                    name = %self.name,
                    processed,
                    total,
                    percent = format!("{:.1}%", percent),
                    rate = format!("{:.1}/s", rate),
                    "Progress"
                );
            }
            _ => {
                tracing::info!(
                    name = %self.name,
                    processed,
                    rate = format!("{:.1}/s", rate),
                    "Progress"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_counts() {
        let tracker =
            ProgressTracker::with_total("test", 100).with_report_interval(Duration::from_millis(1));
        assert_eq!(tracker.processed(), 0);

        tracker.inc();
        assert_eq!(tracker.processed(), 1);

        tracker.inc_by(10);
        assert_eq!(tracker.processed(), 11);
        tracker.complete();
    }

    #[test]
    fn test_unknown_total() {
        let tracker = ProgressTracker::with_optional_total("test", None)
            .with_report_interval(Duration::ZERO);
        tracker.inc_by(3);
        assert_eq!(tracker.processed(), 3);
    }
}
