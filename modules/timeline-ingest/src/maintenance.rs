//! Passes over stored events: score refresh and article-extract backfill.

use timeline_common::{FetchFailure, FetchOperation, ImportanceScorer};
use tracing::{info, warn};

use crate::error::Result;
use crate::progress::{IngestEvent, PercentSteps, ProgressReporter};
use crate::store::{EventFilter, EventStore};
use crate::traits::EngagementSource;

/// Recompute every stored event's importance from its stored metrics.
/// Returns the number of rows updated.
pub async fn refresh_scores(store: &dyn EventStore, scorer: &ImportanceScorer) -> Result<u64> {
    let events = store.list_events(&EventFilter::all()).await?;
    if events.is_empty() {
        info!("No events to score");
        return Ok(0);
    }

    let scores: Vec<(String, f64)> = events
        .iter()
        .map(|e| (e.record.external_id.clone(), scorer.score_event(&e.record)))
        .collect();
    let updated = store.update_scores(&scores).await?;
    info!(events = events.len(), updated, "Importance scores refreshed");
    Ok(updated)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillOutcome {
    pub fetched: u32,
    /// Failed requests plus articles whose extract came back empty.
    pub failed_or_empty: u32,
    pub failures: Vec<FetchFailure>,
}

/// Fetch and store lead extracts for events with an article, most important
/// first. With `only_missing`, events that already have an extract are skipped.
pub async fn backfill_extracts(
    store: &dyn EventStore,
    source: &dyn EngagementSource,
    reporter: &dyn ProgressReporter,
    only_missing: bool,
) -> Result<BackfillOutcome> {
    let events = store
        .list_events(&EventFilter::needing_extracts(only_missing))
        .await?;
    let operation = FetchOperation::Summary;
    let total = events.len();
    reporter.report(IngestEvent::EnrichmentStarted {
        operation,
        total,
        eligible: total,
    });

    let mut outcome = BackfillOutcome::default();
    let mut steps = PercentSteps::new(total);
    for (index, event) in events.iter().enumerate() {
        let Some(article_url) = event.record.article_url.as_deref() else {
            continue;
        };
        match source.summary_extract(article_url).await {
            Ok(Some(extract)) => {
                store.set_extract(&event.record.external_id, &extract).await?;
                outcome.fetched += 1;
            }
            Ok(None) => outcome.failed_or_empty += 1,
            Err(e) => {
                warn!(qid = %event.record.external_id, error = %e, "Summary fetch failed");
                let failure = FetchFailure {
                    identifier: event.record.display_name().to_string(),
                    operation,
                    message: e.to_string(),
                };
                reporter.report(IngestEvent::ItemFailed(failure.clone()));
                outcome.failures.push(failure);
                outcome.failed_or_empty += 1;
            }
        }

        let done = index + 1;
        if let Some(percent) = steps.advance(done) {
            reporter.report(IngestEvent::EnrichmentProgress {
                operation,
                percent,
                done,
                total,
            });
        }
    }

    info!(
        fetched = outcome.fetched,
        failed_or_empty = outcome.failed_or_empty,
        "Extract backfill complete"
    );
    Ok(outcome)
}
