//! Engine-wide statistics helpers.
//!
//! This module defines the `EngineStats` structure tracking how many
//! per-variant predictions the engine served and the `StatsManager` helper
//! that coordinates thread-safe updates to these metrics.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Execution metrics for the detection engine.
///
/// Counts individual per-variant predictions; one ensemble call over two
/// variants contributes two data points.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Total number of per-variant predictions attempted.
    pub total_predictions: usize,
    /// Number of predictions that produced a result.
    pub successful_predictions: usize,
    /// Number of predictions that failed.
    pub failed_predictions: usize,
    /// Average forward-pass time over successful predictions, in
    /// milliseconds.
    pub average_inference_time_ms: f64,
}

impl EngineStats {
    /// Returns the success rate as a percentage (0.0 to 100.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            (self.successful_predictions as f64 / self.total_predictions as f64) * 100.0
        }
    }

    /// Returns the failure rate as a percentage (0.0 to 100.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            (self.failed_predictions as f64 / self.total_predictions as f64) * 100.0
        }
    }
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Engine Statistics:")?;
        writeln!(f, "  Total predictions: {}", self.total_predictions)?;
        writeln!(
            f,
            "  Successful: {} ({:.1}%)",
            self.successful_predictions,
            self.success_rate()
        )?;
        writeln!(
            f,
            "  Failed: {} ({:.1}%)",
            self.failed_predictions,
            self.failure_rate()
        )?;
        writeln!(
            f,
            "  Average inference time: {:.2} ms",
            self.average_inference_time_ms
        )?;
        Ok(())
    }
}

/// Thread-safe manager for updating engine statistics during execution.
#[derive(Debug, Default)]
pub struct StatsManager {
    stats: Mutex<EngineStats>,
}

impl StatsManager {
    /// Creates a new manager with zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the current metrics.
    pub fn snapshot(&self) -> EngineStats {
        self.stats.lock().unwrap().clone()
    }

    /// Records one successful prediction and its forward-pass duration.
    pub fn record_success(&self, duration: Duration) {
        let mut stats = self.stats.lock().unwrap();
        let previous = stats.successful_predictions as f64;
        stats.total_predictions += 1;
        stats.successful_predictions += 1;
        stats.average_inference_time_ms = (stats.average_inference_time_ms * previous
            + duration.as_secs_f64() * 1000.0)
            / (previous + 1.0);
    }

    /// Records one failed prediction.
    pub fn record_failure(&self) {
        let mut stats = self.stats.lock().unwrap();
        stats.total_predictions += 1;
        stats.failed_predictions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_handle_zero_predictions() {
        let stats = EngineStats::default();
        assert_eq!(stats.success_rate(), 0.0);
        assert_eq!(stats.failure_rate(), 0.0);
    }

    #[test]
    fn rates_compute_percentages() {
        let stats = EngineStats {
            total_predictions: 10,
            successful_predictions: 7,
            failed_predictions: 3,
            average_inference_time_ms: 50.0,
        };
        assert_eq!(stats.success_rate(), 70.0);
        assert_eq!(stats.failure_rate(), 30.0);
    }

    #[test]
    fn manager_updates_counters_and_average() {
        let manager = StatsManager::new();
        manager.record_success(Duration::from_millis(100));
        manager.record_success(Duration::from_millis(200));
        manager.record_failure();

        let stats = manager.snapshot();
        assert_eq!(stats.total_predictions, 3);
        assert_eq!(stats.successful_predictions, 2);
        assert_eq!(stats.failed_predictions, 1);
        assert!((stats.average_inference_time_ms - 150.0).abs() < 1e-9);
    }

    #[test]
    fn display_formats_metrics() {
        let stats = EngineStats {
            total_predictions: 10,
            successful_predictions: 8,
            failed_predictions: 2,
            average_inference_time_ms: 125.0,
        };
        let display = stats.to_string();
        assert!(display.contains("Total predictions: 10"));
        assert!(display.contains("Successful: 8 (80.0%)"));
        assert!(display.contains("Failed: 2 (20.0%)"));
        assert!(display.contains("Average inference time: 125.00 ms"));
    }
}
