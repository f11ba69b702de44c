//! Progress reporting for long ingestion loops.
//!
//! Loops emit [`IngestEvent`]s to a [`ProgressReporter`] instead of logging
//! inline; the binary plugs in [`TracingReporter`], tests record events.

use chrono::{DateTime, Utc};
use timeline_common::{BatchKey, FetchFailure, FetchOperation};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    EnrichmentStarted {
        operation: FetchOperation,
        total: usize,
        eligible: usize,
    },
    /// Emitted each time completion crosses another 10% step.
    EnrichmentProgress {
        operation: FetchOperation,
        percent: u32,
        done: usize,
        total: usize,
    },
    ItemFailed(FetchFailure),
    BatchStarted {
        key: BatchKey,
        index: usize,
        total: usize,
    },
    BatchSkipped {
        key: BatchKey,
        last_updated_at: DateTime<Utc>,
    },
    BatchFinished {
        key: BatchKey,
        created: u32,
        updated: u32,
        errors: usize,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Discards every event.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _event: IngestEvent) {}
}

/// Logs events through `tracing`.
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: IngestEvent) {
        match event {
            IngestEvent::EnrichmentStarted {
                operation,
                total,
                eligible,
            } => info!(%operation, eligible, total, "Enrichment started"),
            IngestEvent::EnrichmentProgress {
                operation,
                percent,
                done,
                total,
            } => info!(%operation, "{operation}: {percent}% ({done}/{total})"),
            IngestEvent::ItemFailed(failure) => warn!(
                identifier = %failure.identifier,
                operation = %failure.operation,
                error = %failure.message,
                "Enrichment failed for item"
            ),
            IngestEvent::BatchStarted { key, index, total } => {
                info!(batch = %key, index = index + 1, total, "Batch started")
            }
            IngestEvent::BatchSkipped {
                key,
                last_updated_at,
            } => info!(batch = %key, %last_updated_at, "Batch recently refreshed, skipping"),
            IngestEvent::BatchFinished {
                key,
                created,
                updated,
                errors,
            } => info!(batch = %key, created, updated, errors, "Batch finished"),
        }
    }
}

/// Tracks 10% completion steps for a loop of known length.
#[derive(Debug)]
pub(crate) struct PercentSteps {
    total: usize,
    last_step: u32,
}

impl PercentSteps {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            last_step: 0,
        }
    }

    /// The percentage when `done` crosses into a new 10% step.
    pub(crate) fn advance(&mut self, done: usize) -> Option<u32> {
        if self.total == 0 {
            return None;
        }
        let percent = (done.min(self.total) * 100 / self.total) as u32;
        let step = percent / 10;
        if step > self.last_step {
            self.last_step = step;
            Some(step * 10)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_fire_once_per_decade() {
        let mut steps = PercentSteps::new(20);
        let fired: Vec<u32> = (1..=20).filter_map(|done| steps.advance(done)).collect();
        assert_eq!(fired, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }

    #[test]
    fn short_loops_skip_steps() {
        let mut steps = PercentSteps::new(3);
        let fired: Vec<u32> = (1..=3).filter_map(|done| steps.advance(done)).collect();
        assert_eq!(fired, vec![30, 60, 100]);
    }

    #[test]
    fn empty_loop_reports_nothing() {
        assert_eq!(PercentSteps::new(0).advance(0), None);
    }
}
