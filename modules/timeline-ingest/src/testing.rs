// Test mocks for the ingestion pipeline.
//
// Three mocks matching the three trait boundaries:
// - MockKnowledgeGraph (KnowledgeGraph): canned rows and lookups, records queries
// - MockEngagement (EngagementSource): title→metrics and url→extract maps
// - MemoryEventStore (EventStore): stateful in-memory tables
//
// Plus RecordingReporter and row-building helpers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use timeline_common::{
    BatchKey, BatchProgress, CategoryRecord, EventTypeRecord,
};
use uuid::Uuid;
use wikidata_client::{
    BindingRow, CategoryProperties, CategoryQuery, Engagement, PeriodItem, TypeDiscoveryQuery,
    Var, WikidataError,
};

use crate::error::{IngestError, Result};
use crate::progress::{IngestEvent, ProgressReporter};
use crate::store::{EventFilter, EventOrder, EventStore, EventUpsert, StoredEvent, UpsertCounts};
use crate::traits::{EngagementSource, KnowledgeGraph};

type WikidataResult<T> = wikidata_client::Result<T>;

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

pub fn entity_uri(qid: &str) -> String {
    format!("http://www.wikidata.org/entity/{qid}")
}

/// A result row for one entity with a label.
pub fn item_row(qid: &str, label: &str) -> BindingRow {
    BindingRow::new()
        .with(Var::Item, entity_uri(qid))
        .with(Var::ItemLabel, label)
}

/// An entity row carrying a day-precision point in time and an article.
pub fn dated_row(qid: &str, label: &str, point_in_time: &str) -> BindingRow {
    item_row(qid, label)
        .with(Var::PointInTime, point_in_time)
        .with(Var::PointInTimePrecision, "11")
        .with(
            Var::Article,
            format!("https://en.wikipedia.org/wiki/{}", label.replace(' ', "_")),
        )
}

// ---------------------------------------------------------------------------
// MockKnowledgeGraph
// ---------------------------------------------------------------------------

/// Canned SPARQL answers. Unregistered lookups return empty results.
/// Blocked types fail with a 403; failing types with a network error.
#[derive(Default)]
pub struct MockKnowledgeGraph {
    category_rows: HashMap<String, Vec<BindingRow>>,
    type_rows: HashMap<String, Vec<BindingRow>>,
    properties: HashMap<String, CategoryProperties>,
    labels: HashMap<String, String>,
    period_items: HashMap<String, Vec<PeriodItem>>,
    coordinates: HashMap<String, (f64, f64)>,
    sitelinks: HashMap<String, u32>,
    part_of: HashMap<String, Vec<String>>,
    blocked_types: Vec<String>,
    failing_types: Vec<String>,
    type_queries: Mutex<Vec<TypeDiscoveryQuery>>,
    category_queries: Mutex<Vec<CategoryQuery>>,
}

impl MockKnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_category(mut self, qid: &str, rows: Vec<BindingRow>) -> Self {
        self.category_rows.insert(qid.to_string(), rows);
        self
    }

    /// Rows returned when the first requested type is `type_qid`.
    pub fn on_type(mut self, type_qid: &str, rows: Vec<BindingRow>) -> Self {
        self.type_rows.insert(type_qid.to_string(), rows);
        self
    }

    pub fn block_type(mut self, type_qid: &str) -> Self {
        self.blocked_types.push(type_qid.to_string());
        self
    }

    /// Fail event queries for `type_qid` with a non-fatal network error.
    pub fn failing_type(mut self, type_qid: &str) -> Self {
        self.failing_types.push(type_qid.to_string());
        self
    }

    pub fn with_properties(mut self, qid: &str, props: CategoryProperties) -> Self {
        self.properties.insert(qid.to_string(), props);
        self
    }

    pub fn with_label(mut self, qid: &str, label: &str) -> Self {
        self.labels.insert(qid.to_string(), label.to_string());
        self
    }

    pub fn with_period_items(mut self, period: &str, items: Vec<PeriodItem>) -> Self {
        self.period_items.insert(period.to_string(), items);
        self
    }

    pub fn with_coordinates(mut self, location: &str, lat: f64, lon: f64) -> Self {
        self.coordinates.insert(location.to_string(), (lat, lon));
        self
    }

    pub fn with_sitelinks(mut self, qid: &str, count: u32) -> Self {
        self.sitelinks.insert(qid.to_string(), count);
        self
    }

    pub fn with_part_of(mut self, qid: &str, parents: &[&str]) -> Self {
        self.part_of
            .insert(qid.to_string(), parents.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn type_queries(&self) -> Vec<TypeDiscoveryQuery> {
        self.type_queries.lock().unwrap().clone()
    }

    pub fn category_queries(&self) -> Vec<CategoryQuery> {
        self.category_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeGraph for MockKnowledgeGraph {
    async fn category_rows(&self, query: &CategoryQuery) -> WikidataResult<Vec<BindingRow>> {
        self.category_queries.lock().unwrap().push(query.clone());
        Ok(self
            .category_rows
            .get(&query.category_qid)
            .cloned()
            .unwrap_or_default())
    }

    async fn type_discovery_rows(&self, query: &TypeDiscoveryQuery) -> WikidataResult<Vec<BindingRow>> {
        self.type_queries.lock().unwrap().push(query.clone());
        let first = query.type_qids.first().cloned().unwrap_or_default();
        if self.blocked_types.contains(&first) {
            return Err(WikidataError::Blocked {
                url: "mock://sparql".into(),
            });
        }
        if self.failing_types.contains(&first) {
            return Err(WikidataError::Network(format!("timed out querying {first}")));
        }
        Ok(self.type_rows.get(&first).cloned().unwrap_or_default())
    }

    async fn category_properties(&self, qid: &str) -> WikidataResult<CategoryProperties> {
        Ok(self.properties.get(qid).cloned().unwrap_or_default())
    }

    async fn item_label(&self, qid: &str) -> WikidataResult<Option<String>> {
        Ok(self.labels.get(qid).cloned())
    }

    async fn items_by_time_period(&self, period_qid: &str, limit: u32) -> WikidataResult<Vec<PeriodItem>> {
        let mut items = self.period_items.get(period_qid).cloned().unwrap_or_default();
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn coordinates(&self, location_qids: &[String]) -> WikidataResult<HashMap<String, (f64, f64)>> {
        Ok(location_qids
            .iter()
            .filter_map(|q| self.coordinates.get(q).map(|c| (q.clone(), *c)))
            .collect())
    }

    async fn sitelink_counts(&self, qids: &[String]) -> WikidataResult<HashMap<String, u32>> {
        Ok(qids
            .iter()
            .map(|q| (q.clone(), self.sitelinks.get(q).copied().unwrap_or(0)))
            .collect())
    }

    async fn part_of(&self, qids: &[String]) -> WikidataResult<HashMap<String, Vec<String>>> {
        Ok(qids
            .iter()
            .map(|q| (q.clone(), self.part_of.get(q).cloned().unwrap_or_default()))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MockEngagement
// ---------------------------------------------------------------------------

/// Title→metrics and url→extract maps. Titles registered with `.failing()`
/// return a network error.
#[derive(Default)]
pub struct MockEngagement {
    metrics: HashMap<String, Engagement>,
    extracts: HashMap<String, String>,
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl MockEngagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_title(mut self, title: &str, pageviews_30d: u64, backlinks: u32) -> Self {
        self.metrics.insert(
            title.to_string(),
            Engagement {
                pageviews_30d,
                backlinks,
            },
        );
        self
    }

    pub fn on_extract(mut self, article_url: &str, extract: &str) -> Self {
        self.extracts.insert(article_url.to_string(), extract.to_string());
        self
    }

    /// Fail requests for this title or article URL.
    pub fn failing(mut self, key: &str) -> Self {
        self.failing.push(key.to_string());
        self
    }

    /// Every title or URL requested, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EngagementSource for MockEngagement {
    async fn engagement(&self, title: Option<&str>) -> WikidataResult<Engagement> {
        let Some(title) = title.filter(|t| !t.is_empty()) else {
            return Ok(Engagement::default());
        };
        self.calls.lock().unwrap().push(title.to_string());
        if self.failing.iter().any(|f| f == title) {
            return Err(WikidataError::Network(format!("connection reset for {title}")));
        }
        Ok(self.metrics.get(title).copied().unwrap_or_default())
    }

    async fn summary_extract(&self, article_url: &str) -> WikidataResult<Option<String>> {
        self.calls.lock().unwrap().push(article_url.to_string());
        if self.failing.iter().any(|f| f == article_url) {
            return Err(WikidataError::Api {
                status: 404,
                message: "not found".into(),
            });
        }
        Ok(self
            .extracts
            .get(article_url)
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty()))
    }
}

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    events: Vec<StoredEvent>,
    categories: Vec<CategoryRecord>,
    event_types: Vec<EventTypeRecord>,
    progress: HashMap<BatchKey, BatchProgress>,
    fail_on_upsert: bool,
}

/// In-memory [`EventStore`] with the same upsert and filter semantics as Postgres.
#[derive(Default)]
pub struct MemoryEventStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `upsert_events` call fail without writing.
    pub fn fail_on_upsert(self) -> Self {
        self.inner.lock().unwrap().fail_on_upsert = true;
        self
    }

    pub fn event(&self, external_id: &str) -> Option<StoredEvent> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .find(|e| e.record.external_id == external_id)
            .cloned()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    pub fn event_types(&self) -> Vec<EventTypeRecord> {
        self.inner.lock().unwrap().event_types.clone()
    }

    /// Seed a category directly.
    pub fn with_category(self, external_id: &str, name: &str) -> Self {
        self.inner.lock().unwrap().categories.push(CategoryRecord {
            external_id: external_id.to_string(),
            name: name.to_string(),
            instance_of: Vec::new(),
            subclass_of: Vec::new(),
        });
        self
    }

    /// Seed batch progress directly.
    pub fn with_progress(self, key: BatchKey, progress: BatchProgress) -> Self {
        self.inner.lock().unwrap().progress.insert(key, progress);
        self
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn upsert_category(&self, category: &CategoryRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .categories
            .iter_mut()
            .find(|c| c.external_id == category.external_id)
        {
            Some(existing) => *existing = category.clone(),
            None => inner.categories.push(category.clone()),
        }
        Ok(())
    }

    async fn upsert_event_type(&self, event_type: &EventTypeRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner
            .event_types
            .iter()
            .any(|t| t.external_id == event_type.external_id)
        {
            inner.event_types.push(event_type.clone());
        }
        Ok(())
    }

    async fn upsert_events(&self, events: &[EventUpsert]) -> Result<UpsertCounts> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_on_upsert {
            return Err(IngestError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut counts = UpsertCounts::default();
        for upsert in events {
            let external_id = &upsert.record.external_id;
            match inner
                .events
                .iter_mut()
                .find(|e| &e.record.external_id == external_id)
            {
                Some(existing) => {
                    let extract = existing.record.article_extract.take();
                    existing.record = upsert.record.clone();
                    existing.record.article_extract = extract;
                    if upsert.category_id.is_some() {
                        existing.category_id = upsert.category_id.clone();
                    }
                    if upsert.event_type_id.is_some() {
                        existing.event_type_id = upsert.event_type_id.clone();
                    }
                    counts.updated += 1;
                }
                None => {
                    let mut record = upsert.record.clone();
                    record.article_extract = None;
                    inner.events.push(StoredEvent {
                        id: Uuid::new_v4(),
                        category_id: upsert.category_id.clone(),
                        event_type_id: upsert.event_type_id.clone(),
                        record,
                    });
                    counts.created += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let inner = self.inner.lock().unwrap();
        let mut events: Vec<StoredEvent> = inner
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        match filter.order {
            EventOrder::Chronological => events.sort_by(|a, b| {
                (&a.record.sort_key, &a.record.external_id)
                    .cmp(&(&b.record.sort_key, &b.record.external_id))
            }),
            EventOrder::ImportanceDesc => events.sort_by(|a, b| {
                let a_score = a.record.importance_score.unwrap_or(f64::NEG_INFINITY);
                let b_score = b.record.importance_score.unwrap_or(f64::NEG_INFINITY);
                b_score
                    .total_cmp(&a_score)
                    .then_with(|| a.record.sort_key.cmp(&b.record.sort_key))
            }),
        }
        Ok(events)
    }

    async fn categories(&self) -> Result<Vec<CategoryRecord>> {
        Ok(self.inner.lock().unwrap().categories.clone())
    }

    async fn update_scores(&self, scores: &[(String, f64)]) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0;
        for (id, score) in scores {
            if let Some(event) = inner.events.iter_mut().find(|e| &e.record.external_id == id) {
                event.record.importance_score = Some(*score);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn assign_categories(&self, assignments: &[(String, String)]) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0;
        for (id, category) in assignments {
            if let Some(event) = inner.events.iter_mut().find(|e| &e.record.external_id == id) {
                event.category_id = Some(category.clone());
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn assign_category_to_all(&self, filter: &EventFilter, category_id: &str) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.categories.iter().any(|c| c.external_id == category_id) {
            return Err(IngestError::NotFound(format!("category {category_id}")));
        }
        let mut changed = 0;
        for event in inner.events.iter_mut().filter(|e| filter.matches(e)) {
            event.category_id = Some(category_id.to_string());
            changed += 1;
        }
        Ok(changed)
    }

    async fn set_extract(&self, external_id: &str, extract: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(event) = inner
            .events
            .iter_mut()
            .find(|e| e.record.external_id == external_id)
        {
            event.record.article_extract = Some(extract.to_string());
        }
        Ok(())
    }

    async fn batch_progress(&self, key: &BatchKey) -> Result<Option<BatchProgress>> {
        Ok(self.inner.lock().unwrap().progress.get(key).cloned())
    }

    async fn record_batch_progress(&self, key: &BatchKey, progress: &BatchProgress) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .progress
            .insert(key.clone(), progress.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Collects every progress event.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<IngestEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: IngestEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Progress stamped now.
pub fn progress_now(events_created: u32) -> BatchProgress {
    BatchProgress {
        last_updated_at: Utc::now(),
        events_created,
        error_count: 0,
    }
}
