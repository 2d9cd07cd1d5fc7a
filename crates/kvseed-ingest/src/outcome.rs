//! Per-item outcomes and the run summary

use serde::Serialize;
use tracing::{info, warn};

/// Maximum failure samples kept for the summary
pub const MAX_FAILURE_SAMPLES: usize = 20;

/// Terminal result of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Skipped,
    Failed(String),
}

/// A failed item kept for the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureSample {
    pub key: String,
    pub reason: String,
}

/// Run totals. Every resolved item lands in exactly one of
/// `success`, `skipped` or `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounter {
    pub total: u64,
    pub success: u64,
    pub skipped: u64,
    pub failed: u64,
    failures: Vec<FailureSample>,
    #[serde(skip)]
    progress_every: u64,
}

impl OutcomeCounter {
    /// Counter that logs a progress line every `progress_every` items
    /// (0 disables progress lines)
    pub fn with_progress_every(progress_every: u64) -> Self {
        Self {
            progress_every,
            ..Self::default()
        }
    }

    pub fn record(&mut self, key: &str, outcome: &ItemOutcome) {
        self.total += 1;
        match outcome {
            ItemOutcome::Success => self.success += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed(reason) => {
                self.failed += 1;
                warn!(key = %key, reason = %reason, "Item failed");
                if self.failures.len() < MAX_FAILURE_SAMPLES {
                    self.failures.push(FailureSample {
                        key: key.to_string(),
                        reason: reason.clone(),
                    });
                }
            },
        }

        if self.progress_every > 0 && self.total % self.progress_every == 0 {
            info!(
                processed = self.total,
                success = self.success,
                skipped = self.skipped,
                failed = self.failed,
                "Progress"
            );
        }
    }

    /// The first failures, in resolution order
    pub fn failure_samples(&self) -> &[FailureSample] {
        &self.failures
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn log_summary(&self) {
        info!("==== Upload summary ====");
        info!("Total processed: {}", self.total);
        info!("Success: {}", self.success);
        info!("Skipped: {}", self.skipped);
        info!("Failed: {}", self.failed);
        if !self.failures.is_empty() {
            info!("Failure samples (first {}):", self.failures.len());
            for sample in &self.failures {
                info!("  {} -> {}", sample.key, sample.reason);
            }
        }
    }
}
