//! Loader: query → group → enrich → score → upsert.
//!
//! Two entry points share the tail of the pipeline:
//! - [`EventLoader::load_category`] ingests everything under one category
//!   (instance-of/subclass closure) and links events to it.
//! - [`EventLoader::load_by_type`] ingests one curated event type, links events
//!   to the type and resolves their category from stored categories.
//!
//! Per-item enrichment failures land in [`LoadOutcome::failures`]; only query,
//! transport and persistence errors are returned as `Err`.

use std::collections::HashSet;
use std::sync::Arc;

use timeline_common::{
    is_entity_id, sort_chronologically, CategoryRecord, EventRecord, EventTypeRecord,
    FetchFailure, ImportanceScorer,
};
use tracing::info;
use typed_builder::TypedBuilder;
use wikidata_client::{
    resolve_event_type, CategoryQuery, TypeDiscoveryQuery, WikidataError, YearRange,
    DEFAULT_MIN_SITELINKS,
};

use crate::category::resolve_category;
use crate::enrichment::{enrich_coordinates, enrich_engagement, enrich_sitelinks};
use crate::error::{IngestError, Result};
use crate::grouping::group_rows;
use crate::progress::{ProgressReporter, SilentReporter};
use crate::store::{truncate_fields, EventStore, EventUpsert};
use crate::traits::{EngagementSource, KnowledgeGraph};

pub const DEFAULT_CATEGORY_LIMIT: u32 = 50;
pub const DEFAULT_TYPE_LIMIT: u32 = 500;

#[derive(Debug, Clone, TypedBuilder)]
pub struct LoadOptions {
    #[builder(default)]
    pub years: YearRange,
    /// Row cap for the primary query; each mode has its own default.
    #[builder(default, setter(strip_option))]
    pub limit: Option<u32>,
    /// Type discovery only.
    #[builder(default = DEFAULT_MIN_SITELINKS)]
    pub min_sitelinks: u32,
    #[builder(default = true)]
    pub fetch_engagement: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    pub created: u32,
    pub updated: u32,
    pub failures: Vec<FetchFailure>,
}

#[derive(Clone, TypedBuilder)]
pub struct EventLoader {
    graph: Arc<dyn KnowledgeGraph>,
    engagement: Arc<dyn EngagementSource>,
    store: Arc<dyn EventStore>,
    #[builder(default)]
    scorer: ImportanceScorer,
    #[builder(default = Arc::new(SilentReporter) as Arc<dyn ProgressReporter>)]
    reporter: Arc<dyn ProgressReporter>,
}

impl EventLoader {
    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    pub fn graph(&self) -> &dyn KnowledgeGraph {
        self.graph.as_ref()
    }

    pub fn engagement(&self) -> &dyn EngagementSource {
        self.engagement.as_ref()
    }

    pub fn scorer(&self) -> &ImportanceScorer {
        &self.scorer
    }

    pub fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    /// Ingest every dated entity in the instance-of/subclass closure of a category.
    pub async fn load_category(&self, category_qid: &str, options: &LoadOptions) -> Result<LoadOutcome> {
        if !is_entity_id(category_qid) {
            return Err(WikidataError::InvalidId(category_qid.to_string()).into());
        }

        let properties = self.graph.category_properties(category_qid).await?;
        let name = if properties.label.is_empty() {
            category_qid.to_string()
        } else {
            properties.label
        };
        let category = CategoryRecord {
            external_id: category_qid.to_string(),
            name,
            instance_of: properties.instance_of,
            subclass_of: properties.subclass_of,
        };
        self.store.upsert_category(&category).await?;
        info!(category = %category_qid, name = %category.name, "Category refreshed");

        let query = CategoryQuery {
            category_qid: category_qid.to_string(),
            years: options.years,
            limit: options.limit.unwrap_or(DEFAULT_CATEGORY_LIMIT),
        };
        let rows = self.graph.category_rows(&query).await?;
        let mut records = group_rows(&rows);
        sort_chronologically(&mut records);
        info!(category = %category_qid, rows = rows.len(), entities = records.len(), "Category rows grouped");

        let mut failures = enrich_coordinates(self.graph.as_ref(), &mut records, self.reporter.as_ref()).await;
        failures.extend(enrich_sitelinks(self.graph.as_ref(), &mut records, self.reporter.as_ref()).await);
        if options.fetch_engagement {
            failures.extend(
                enrich_engagement(self.engagement.as_ref(), &mut records, self.reporter.as_ref()).await,
            );
        }
        self.apply_scores(&mut records);

        let upserts: Vec<EventUpsert> = records
            .iter()
            .map(|record| EventUpsert {
                category_id: Some(category_qid.to_string()),
                ..EventUpsert::new(truncate_fields(record))
            })
            .collect();
        self.persist(upserts, failures).await
    }

    /// Ingest one event type, given as an id or a curated label.
    pub async fn load_by_type(&self, event_type: &str, options: &LoadOptions) -> Result<LoadOutcome> {
        let (type_qid, type_name) = resolve_event_type(event_type)
            .ok_or_else(|| IngestError::NotFound(format!("event type {event_type:?}")))?;

        self.store
            .upsert_event_type(&EventTypeRecord {
                external_id: type_qid.clone(),
                name: type_name.clone(),
            })
            .await?;

        let query = TypeDiscoveryQuery {
            type_qids: vec![type_qid.clone()],
            years: options.years,
            min_sitelinks: options.min_sitelinks,
            limit: options.limit.unwrap_or(DEFAULT_TYPE_LIMIT),
        };
        let rows = self.graph.type_discovery_rows(&query).await?;
        let mut records = group_rows(&rows);
        sort_chronologically(&mut records);
        info!(
            event_type = %type_qid,
            name = %type_name,
            rows = rows.len(),
            entities = records.len(),
            "Type rows grouped"
        );

        let mut failures = enrich_coordinates(self.graph.as_ref(), &mut records, self.reporter.as_ref()).await;
        if options.fetch_engagement {
            failures.extend(
                enrich_engagement(self.engagement.as_ref(), &mut records, self.reporter.as_ref()).await,
            );
        }
        self.apply_scores(&mut records);

        let known: HashSet<String> = self
            .store
            .categories()
            .await?
            .into_iter()
            .map(|c| c.external_id)
            .collect();
        let upserts: Vec<EventUpsert> = records
            .iter()
            .map(|record| EventUpsert {
                category_id: resolve_category(&record.part_of_ids, &known, &record.external_id),
                event_type_id: Some(type_qid.clone()),
                record: truncate_fields(record),
            })
            .collect();
        self.persist(upserts, failures).await
    }

    fn apply_scores(&self, records: &mut [EventRecord]) {
        for record in records.iter_mut() {
            record.importance_score = Some(self.scorer.score_event(record));
        }
    }

    async fn persist(&self, upserts: Vec<EventUpsert>, failures: Vec<FetchFailure>) -> Result<LoadOutcome> {
        if upserts.is_empty() {
            info!("Nothing to upsert");
            return Ok(LoadOutcome {
                failures,
                ..LoadOutcome::default()
            });
        }
        let counts = self.store.upsert_events(&upserts).await?;
        info!(
            created = counts.created,
            updated = counts.updated,
            failures = failures.len(),
            "Events upserted"
        );
        Ok(LoadOutcome {
            created: counts.created,
            updated: counts.updated,
            failures,
        })
    }
}
