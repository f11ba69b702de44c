//! Enrichment passes over grouped records.
//!
//! Every pass is failure-isolated: an error becomes a [`FetchFailure`] and the
//! affected metric keeps its zero default. Records are visited in order.

use std::collections::HashSet;

use timeline_common::{EventRecord, FetchFailure, FetchOperation};
use tracing::{debug, warn};

use crate::progress::{IngestEvent, PercentSteps, ProgressReporter};
use crate::traits::{EngagementSource, KnowledgeGraph};

fn failure(identifier: impl Into<String>, operation: FetchOperation, message: String) -> FetchFailure {
    FetchFailure {
        identifier: identifier.into(),
        operation,
        message,
    }
}

/// Fill latitude/longitude for every record whose location has coordinates.
pub async fn enrich_coordinates(
    graph: &dyn KnowledgeGraph,
    records: &mut [EventRecord],
    reporter: &dyn ProgressReporter,
) -> Vec<FetchFailure> {
    let mut seen = HashSet::new();
    let locations: Vec<String> = records
        .iter()
        .filter_map(|r| r.location.qid.clone())
        .filter(|qid| seen.insert(qid.clone()))
        .collect();
    if locations.is_empty() {
        return Vec::new();
    }

    match graph.coordinates(&locations).await {
        Ok(coords) => {
            for record in records.iter_mut() {
                let found = record.location.qid.as_ref().and_then(|q| coords.get(q));
                if let Some((lat, lon)) = found {
                    record.location.lat = Some(*lat);
                    record.location.lon = Some(*lon);
                }
            }
            debug!(locations = locations.len(), resolved = coords.len(), "Coordinates fetched");
            Vec::new()
        }
        Err(e) => {
            let f = failure(
                format!("{} locations", locations.len()),
                FetchOperation::Coordinates,
                e.to_string(),
            );
            reporter.report(IngestEvent::ItemFailed(f.clone()));
            vec![f]
        }
    }
}

/// Replace each record's sitelink count with a counted value from the graph.
pub async fn enrich_sitelinks(
    graph: &dyn KnowledgeGraph,
    records: &mut [EventRecord],
    reporter: &dyn ProgressReporter,
) -> Vec<FetchFailure> {
    if records.is_empty() {
        return Vec::new();
    }
    let ids: Vec<String> = records.iter().map(|r| r.external_id.clone()).collect();

    match graph.sitelink_counts(&ids).await {
        Ok(counts) => {
            for record in records.iter_mut() {
                if let Some(count) = counts.get(&record.external_id) {
                    record.sitelink_count = *count;
                }
            }
            Vec::new()
        }
        Err(e) => {
            let f = failure(
                format!("{} items", ids.len()),
                FetchOperation::SitelinkCounts,
                e.to_string(),
            );
            reporter.report(IngestEvent::ItemFailed(f.clone()));
            vec![f]
        }
    }
}

/// Fetch pageviews and backlinks for every record with an article title.
pub async fn enrich_engagement(
    source: &dyn EngagementSource,
    records: &mut [EventRecord],
    reporter: &dyn ProgressReporter,
) -> Vec<FetchFailure> {
    let operation = FetchOperation::PageviewsBacklinks;
    let total = records.len();
    let eligible = records
        .iter()
        .filter(|r| r.article_title.as_deref().is_some_and(|t| !t.is_empty()))
        .count();
    reporter.report(IngestEvent::EnrichmentStarted {
        operation,
        total,
        eligible,
    });

    let mut failures = Vec::new();
    let mut steps = PercentSteps::new(total);
    for (index, record) in records.iter_mut().enumerate() {
        match source.engagement(record.article_title.as_deref()).await {
            Ok(engagement) => {
                record.pageviews_30d = engagement.pageviews_30d;
                record.backlink_count = engagement.backlinks;
            }
            Err(e) => {
                warn!(qid = %record.external_id, error = %e, "Engagement fetch failed");
                record.pageviews_30d = 0;
                record.backlink_count = 0;
                let f = failure(record.display_name(), operation, e.to_string());
                reporter.report(IngestEvent::ItemFailed(f.clone()));
                failures.push(f);
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
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEngagement, MockKnowledgeGraph, RecordingReporter};

    fn record(qid: &str, label: &str, title: Option<&str>) -> EventRecord {
        let mut r = EventRecord::new(qid);
        r.label = label.to_string();
        r.article_title = title.map(str::to_string);
        r
    }

    #[tokio::test]
    async fn engagement_failure_is_isolated() {
        let source = MockEngagement::new()
            .on_title("Battle_of_Hastings", 1200, 40)
            .failing("Battle_of_Agincourt");
        let reporter = RecordingReporter::new();
        let mut records = vec![
            record("Q1", "Hastings", Some("Battle_of_Hastings")),
            record("Q2", "Agincourt", Some("Battle_of_Agincourt")),
            record("Q3", "", None),
        ];

        let failures = enrich_engagement(&source, &mut records, &reporter).await;

        assert_eq!(records[0].pageviews_30d, 1200);
        assert_eq!(records[0].backlink_count, 40);
        assert_eq!(records[1].pageviews_30d, 0);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].identifier, "Agincourt");
        assert_eq!(failures[0].operation, FetchOperation::PageviewsBacklinks);
        assert_eq!(source.calls(), vec!["Battle_of_Hastings", "Battle_of_Agincourt"]);

        let events = reporter.events();
        assert_eq!(
            events.first(),
            Some(&IngestEvent::EnrichmentStarted {
                operation: FetchOperation::PageviewsBacklinks,
                total: 3,
                eligible: 2,
            })
        );
        assert!(events.contains(&IngestEvent::EnrichmentProgress {
            operation: FetchOperation::PageviewsBacklinks,
            percent: 100,
            done: 3,
            total: 3,
        }));
    }

    #[tokio::test]
    async fn coordinates_fill_matching_locations() {
        let graph = MockKnowledgeGraph::new().with_coordinates("Q90", 48.85, 2.35);
        let mut records = vec![record("Q1", "A", None), record("Q2", "B", None)];
        records[0].location.qid = Some("Q90".into());
        records[1].location.qid = Some("Q64".into());

        let failures = enrich_coordinates(&graph, &mut records, &RecordingReporter::new()).await;

        assert!(failures.is_empty());
        assert_eq!(records[0].location.lat, Some(48.85));
        assert_eq!(records[0].location.lon, Some(2.35));
        assert_eq!(records[1].location.lat, None);
    }

    #[tokio::test]
    async fn sitelinks_replace_counts() {
        let graph = MockKnowledgeGraph::new().with_sitelinks("Q1", 42);
        let mut records = vec![record("Q1", "A", None), record("Q2", "B", None)];
        records[1].sitelink_count = 7;

        enrich_sitelinks(&graph, &mut records, &RecordingReporter::new()).await;

        assert_eq!(records[0].sitelink_count, 42);
        assert_eq!(records[1].sitelink_count, 0);
    }
}
