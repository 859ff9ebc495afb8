// src/utils/progress_bars/progress_callback.rs - Progress hooks the pipeline reports through

use log::{debug, info};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Takes phase name and optional detailed progress information
pub type ProgressCallback = Arc<dyn Fn(String, Option<String>) + Send + Sync>;

/// Called with `(processed_count, total_count)` after every finished row.
/// Rows finish on several tasks at once, so calls may interleave, but every
/// count from 1 to the number of finished rows is reported exactly once.
pub type BatchProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Helper function to create a simple phase callback that only logs at debug level
pub fn create_simple_callback(stage_name: &str) -> ProgressCallback {
    let stage_name = stage_name.to_string();
    Arc::new(move |phase: String, details: Option<String>| {
        let detail_str = details.map(|d| format!(" - {}", d)).unwrap_or_default();
        debug!("[{}] Progress: {}{}", stage_name, phase, detail_str);
    })
}

/// Row callback that logs every 10% (and the last row) instead of drawing a bar.
pub fn create_logging_batch_callback(stage_name: &str) -> BatchProgressCallback {
    let stage_name = stage_name.to_string();
    Arc::new(move |processed: usize, total: usize| {
        let step = (total / 10).max(1);
        if processed % step == 0 || processed == total {
            let percent = if total > 0 {
                processed as f64 / total as f64 * 100.0
            } else {
                100.0
            };
            info!("[{}] 📊 Rows matched: {}/{} ({:.1}%)", stage_name, processed, total, percent);
        }
    })
}

/// Shared row counter handing out the value passed to a [`BatchProgressCallback`].
#[derive(Clone)]
pub struct RowProgress {
    processed: Arc<AtomicUsize>,
    total: usize,
    callback: Option<BatchProgressCallback>,
}

impl RowProgress {
    pub fn new(total: usize, callback: Option<BatchProgressCallback>) -> Self {
        Self {
            processed: Arc::new(AtomicUsize::new(0)),
            total,
            callback,
        }
    }

    pub fn row_done(&self) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(ref cb) = self.callback {
            cb(processed, self.total);
        }
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }
}

/// Progress tracking helper for the loading / indexing / matching phases of a run
pub struct ProgressTracker {
    callback: Option<ProgressCallback>,
    current_phase: String,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            current_phase: "Initializing".to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn set_phase(&mut self, phase: &str) {
        self.current_phase = phase.to_string();
        if let Some(ref cb) = self.callback {
            cb(phase.to_string(), None);
        }
    }

    pub fn set_phase_with_details(&mut self, phase: &str, details: &str) {
        self.current_phase = phase.to_string();
        if let Some(ref cb) = self.callback {
            cb(phase.to_string(), Some(details.to_string()));
        }
    }

    pub fn current_phase(&self) -> &str {
        &self.current_phase
    }

    pub fn finish_phase(&self, summary: &str) {
        if let Some(ref cb) = self.callback {
            let elapsed = self.start_time.elapsed();
            let details = format!("{} in {:.2}s", summary, elapsed.as_secs_f64());
            cb("Completed".to_string(), Some(details));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_tracker() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let callback = Arc::new(move |_phase: String, _details: Option<String>| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let mut tracker = ProgressTracker::new(Some(callback));
        tracker.set_phase("Loading rules");
        tracker.set_phase_with_details("Building index", "12 entries");
        tracker.finish_phase("done");

        assert_eq!(tracker.current_phase(), "Building index");
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_row_progress_reports_every_count_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let progress = RowProgress::new(
            40,
            Some(Arc::new(move |processed, total| {
                assert_eq!(total, 40);
                seen_clone.lock().unwrap().push(processed);
            })),
        );

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let progress = progress.clone();
                scope.spawn(move || {
                    for _ in 0..10 {
                        progress.row_done();
                    }
                });
            }
        });

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (1..=40).collect::<Vec<_>>());
        assert_eq!(progress.processed(), 40);
    }

    #[test]
    fn test_simple_callbacks_do_not_panic() {
        let callback = create_simple_callback("TestStage");
        callback("TestPhase".to_string(), Some("TestDetails".to_string()));
        callback("TestPhase2".to_string(), None);

        let rows = create_logging_batch_callback("TestStage");
        rows(0, 0);
        rows(5, 10);
    }
}
