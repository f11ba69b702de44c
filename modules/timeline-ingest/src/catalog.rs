//! Full-catalog ingestion in `(type, year-window)` chunks.
//!
//! Each chunk is one type load committed on its own, so a crash loses at most
//! one chunk. Progress rows are written only for chunks that loaded, and let a
//! rerun skip chunks refreshed after a cutoff.

use chrono::{DateTime, Utc};
use timeline_common::{BatchKey, BatchProgress};
use tracing::{error, info};
use typed_builder::TypedBuilder;
use uuid::Uuid;
use wikidata_client::{default_type_qids, resolve_event_type, YearRange};

use crate::error::Result;
use crate::loader::{EventLoader, LoadOptions};
use crate::progress::IngestEvent;

#[derive(Debug, Clone, TypedBuilder)]
pub struct CatalogPlan {
    /// Type ids or curated labels; empty means every curated type.
    #[builder(default)]
    pub types: Vec<String>,
    pub year_start: i32,
    pub year_end: i32,
    /// Years per chunk; clamped to at least 1.
    #[builder(default = 50)]
    pub window: u32,
    #[builder(default, setter(strip_option))]
    pub limit: Option<u32>,
    #[builder(default, setter(strip_option))]
    pub skip_refreshed_since: Option<DateTime<Utc>>,
    #[builder(default = true)]
    pub fetch_engagement: bool,
}

impl CatalogPlan {
    /// Inclusive year windows covering `[year_start, year_end]`.
    pub fn windows(&self) -> Vec<(i32, i32)> {
        let width = self.window.max(1) as i64;
        let end = self.year_end as i64;
        let mut windows = Vec::new();
        let mut start = self.year_start as i64;
        while start <= end {
            let stop = (start + width - 1).min(end);
            windows.push((start as i32, stop as i32));
            start = stop + 1;
        }
        windows
    }

    /// Every chunk, type-major. Curated labels are keyed by their type id.
    pub fn keys(&self) -> Vec<BatchKey> {
        let types: Vec<String> = if self.types.is_empty() {
            default_type_qids()
        } else {
            self.types
                .iter()
                .map(|t| resolve_event_type(t).map(|(qid, _)| qid).unwrap_or_else(|| t.clone()))
                .collect()
        };
        let windows = self.windows();
        types
            .iter()
            .flat_map(|type_id| {
                windows.iter().map(move |(year_start, year_end)| BatchKey {
                    type_id: type_id.clone(),
                    year_start: *year_start,
                    year_end: *year_end,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogOutcome {
    pub batches_run: usize,
    pub batches_skipped: usize,
    pub created: u32,
    pub updated: u32,
    pub failures: usize,
}

/// Run every chunk in order. A block or a store error stops the run and is
/// returned; chunks already finished stay committed. Any other chunk error is
/// logged and counted, and the chunk gets no progress row.
pub async fn load_catalog(loader: &EventLoader, plan: &CatalogPlan) -> Result<CatalogOutcome> {
    let run_id = Uuid::new_v4();
    let keys = plan.keys();
    let total = keys.len();
    info!(%run_id, batches = total, "Catalog ingestion started");

    let mut outcome = CatalogOutcome::default();
    for (index, key) in keys.into_iter().enumerate() {
        if let Some(cutoff) = plan.skip_refreshed_since {
            if let Some(progress) = loader.store().batch_progress(&key).await? {
                if progress.last_updated_at > cutoff {
                    loader.reporter().report(IngestEvent::BatchSkipped {
                        key,
                        last_updated_at: progress.last_updated_at,
                    });
                    outcome.batches_skipped += 1;
                    continue;
                }
            }
        }

        loader.reporter().report(IngestEvent::BatchStarted {
            key: key.clone(),
            index,
            total,
        });

        let options = LoadOptions {
            years: YearRange::new(Some(key.year_start), Some(key.year_end)),
            limit: plan.limit,
            fetch_engagement: plan.fetch_engagement,
            ..LoadOptions::default()
        };

        let (created, updated, errors) = match loader.load_by_type(&key.type_id, &options).await {
            Ok(load) => {
                let errors = load.failures.len();
                loader
                    .store()
                    .record_batch_progress(
                        &key,
                        &BatchProgress {
                            last_updated_at: Utc::now(),
                            events_created: load.created,
                            error_count: errors as u32,
                        },
                    )
                    .await?;
                (load.created, load.updated, errors)
            }
            Err(e) if e.is_fatal() => {
                error!(%run_id, batch = %key, error = %e, "Fatal error, aborting catalog run");
                return Err(e);
            }
            Err(e) if e.is_persistence() => {
                error!(%run_id, batch = %key, error = %e, "Store failed, aborting catalog run");
                return Err(e);
            }
            Err(e) => {
                // No progress row, so the next run picks this chunk up again.
                error!(%run_id, batch = %key, error = %e, "Batch failed");
                (0, 0, 1)
            }
        };

        loader.reporter().report(IngestEvent::BatchFinished {
            key,
            created,
            updated,
            errors,
        });
        outcome.batches_run += 1;
        outcome.created += created;
        outcome.updated += updated;
        outcome.failures += errors;
    }

    info!(
        %run_id,
        run = outcome.batches_run,
        skipped = outcome.batches_skipped,
        created = outcome.created,
        updated = outcome.updated,
        "Catalog ingestion finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_range_inclusively() {
        let plan = CatalogPlan::builder()
            .year_start(1900)
            .year_end(1999)
            .window(40)
            .build();
        assert_eq!(plan.windows(), vec![(1900, 1939), (1940, 1979), (1980, 1999)]);
    }

    #[test]
    fn bce_ranges_and_zero_window() {
        let plan = CatalogPlan::builder()
            .year_start(-3)
            .year_end(-1)
            .window(0)
            .build();
        assert_eq!(plan.windows(), vec![(-3, -3), (-2, -2), (-1, -1)]);
    }

    #[test]
    fn keys_are_type_major() {
        let plan = CatalogPlan::builder()
            .types(vec!["battle".into(), "Q198".into()])
            .year_start(1800)
            .year_end(1899)
            .window(50)
            .build();
        let keys: Vec<String> = plan.keys().iter().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            vec![
                "Q178561[1800..=1849]",
                "Q178561[1850..=1899]",
                "Q198[1800..=1849]",
                "Q198[1850..=1899]",
            ]
        );
    }

    #[test]
    fn empty_type_list_means_all_curated_types() {
        let plan = CatalogPlan::builder().year_start(2000).year_end(2000).build();
        assert_eq!(plan.keys().len(), default_type_qids().len());
    }
}
