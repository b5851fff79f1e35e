//! Upload progress snapshots handed to the listener.

use std::time::Duration;

use serde::Serialize;

/// Progress of the data transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UploadProgress {
    /// Percentage of the file sent, in `[0, 100]`.
    pub percentage: f64,
    /// Estimated time left, extrapolated from the elapsed transfer time.
    pub remaining_time_ms: u64,
}

impl UploadProgress {
    /// Compute progress after `sent` of `total` bytes, `elapsed` after the
    /// transfer started.
    pub fn compute(sent: usize, total: usize, elapsed: Duration) -> Self {
        if total == 0 {
            return Self {
                percentage: 100.0,
                remaining_time_ms: 0,
            };
        }

        let sent = sent.min(total);
        let percentage = (sent as f64 * 100.0 / total as f64).clamp(0.0, 100.0);

        let remaining_time_ms = if sent == 0 {
            0
        } else {
            let elapsed_ms = elapsed.as_millis() as f64;
            let remaining = elapsed_ms * (total - sent) as f64 / sent as f64;
            remaining.max(0.0).round() as u64
        };

        Self {
            percentage,
            remaining_time_ms,
        }
    }

    /// Get a human-readable message for this snapshot.
    pub fn message(&self) -> String {
        let seconds = self.remaining_time_ms.div_ceil(1000);
        format!(
            "Uploading firmware... {:.0}% ({}s remaining)",
            self.percentage, seconds
        )
    }
}
