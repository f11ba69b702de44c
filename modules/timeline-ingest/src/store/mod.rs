//! Persistence boundary for events, categories, event types and batch progress.

mod postgres;

pub use postgres::PgEventStore;

use async_trait::async_trait;
use timeline_common::{
    BatchKey, BatchProgress, CategoryRecord, EventRecord, EventTypeRecord,
};
use uuid::Uuid;

use crate::error::Result;

// --- Column limits ---

pub const MAX_TEXT: usize = 500;
pub const MAX_DESCRIPTION: usize = 50_000;
pub const MAX_ENTITY_ID: usize = 20;
pub const MAX_SORT_KEY: usize = 32;

/// One event to write, with the links it should carry. `None` links leave an
/// existing link untouched on update.
#[derive(Debug, Clone, PartialEq)]
pub struct EventUpsert {
    pub record: EventRecord,
    pub category_id: Option<String>,
    pub event_type_id: Option<String>,
}

impl EventUpsert {
    pub fn new(record: EventRecord) -> Self {
        Self {
            record,
            category_id: None,
            event_type_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub created: u32,
    pub updated: u32,
}

/// A persisted event plus its links.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub id: Uuid,
    pub category_id: Option<String>,
    pub event_type_id: Option<String>,
    pub record: EventRecord,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventOrder {
    /// Sort key ascending, then external id.
    #[default]
    Chronological,
    /// Highest importance first; unscored events last.
    ImportanceDesc,
}

/// Selection for reads and bulk updates. The default selects every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub ids: Option<Vec<String>>,
    pub only_uncategorized: bool,
    pub missing_extract: bool,
    pub has_article: bool,
    /// Inclusive sort-key bounds.
    pub sort_key_from: Option<String>,
    pub sort_key_to: Option<String>,
    pub order: EventOrder,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to these external ids. An empty list means no restriction.
    pub fn with_ids(mut self, ids: Vec<String>) -> Self {
        self.ids = if ids.is_empty() { None } else { Some(ids) };
        self
    }

    pub fn uncategorized(mut self, only: bool) -> Self {
        self.only_uncategorized = only;
        self
    }

    pub fn in_date_range(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.sort_key_from = from;
        self.sort_key_to = to;
        self
    }

    /// Events with an article URL, optionally only those lacking an extract,
    /// most important first.
    pub fn needing_extracts(only_missing: bool) -> Self {
        Self {
            has_article: true,
            missing_extract: only_missing,
            order: EventOrder::ImportanceDesc,
            ..Self::default()
        }
    }

    /// In-memory evaluation of the filter predicates (ordering excluded).
    pub fn matches(&self, event: &StoredEvent) -> bool {
        let record = &event.record;
        if let Some(ids) = &self.ids {
            if !ids.contains(&record.external_id) {
                return false;
            }
        }
        if self.only_uncategorized && event.category_id.is_some() {
            return false;
        }
        if self.has_article && record.article_url.as_deref().unwrap_or_default().is_empty() {
            return false;
        }
        if self.missing_extract && !record.article_extract.as_deref().unwrap_or_default().is_empty() {
            return false;
        }
        if let Some(from) = &self.sort_key_from {
            if record.sort_key.as_str() < from.as_str() {
                return false;
            }
        }
        if let Some(to) = &self.sort_key_to {
            if record.sort_key.as_str() > to.as_str() {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Create or refresh a category by external id.
    async fn upsert_category(&self, category: &CategoryRecord) -> Result<()>;

    async fn upsert_event_type(&self, event_type: &EventTypeRecord) -> Result<()>;

    /// Upsert every event by external id in one transaction. Either all
    /// writes land or none do.
    async fn upsert_events(&self, events: &[EventUpsert]) -> Result<UpsertCounts>;

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>>;

    async fn categories(&self) -> Result<Vec<CategoryRecord>>;

    /// Bulk score update: `(external_id, score)`. Returns rows changed.
    async fn update_scores(&self, scores: &[(String, f64)]) -> Result<u64>;

    /// Bulk category assignment: `(event external_id, category external_id)`.
    async fn assign_categories(&self, assignments: &[(String, String)]) -> Result<u64>;

    /// Link every selected event to one category. Fails with `NotFound` when
    /// the category is unknown.
    async fn assign_category_to_all(&self, filter: &EventFilter, category_id: &str) -> Result<u64>;

    async fn set_extract(&self, external_id: &str, extract: &str) -> Result<()>;

    async fn batch_progress(&self, key: &BatchKey) -> Result<Option<BatchProgress>>;

    async fn record_batch_progress(&self, key: &BatchKey, progress: &BatchProgress) -> Result<()>;
}

// --- Field limits ---

fn truncate(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((end, _)) => value[..end].to_string(),
        None => value.to_string(),
    }
}

fn truncate_opt(value: &Option<String>, max_chars: usize) -> Option<String> {
    value.as_deref().map(|v| truncate(v, max_chars))
}

/// Clamp text fields to their column widths (counted in characters).
pub fn truncate_fields(record: &EventRecord) -> EventRecord {
    let mut out = record.clone();
    out.label = truncate(&record.label, MAX_TEXT);
    out.description = truncate(&record.description, MAX_DESCRIPTION);
    out.location.name = truncate_opt(&record.location.name, MAX_TEXT);
    out.location.qid = truncate_opt(&record.location.qid, MAX_ENTITY_ID);
    out.external_url = truncate_opt(&record.external_url, MAX_TEXT);
    out.article_url = truncate_opt(&record.article_url, MAX_TEXT);
    out.article_title = truncate_opt(&record.article_title, MAX_TEXT);
    out.sort_key = truncate(&record.sort_key, MAX_SORT_KEY);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(qid: &str) -> StoredEvent {
        StoredEvent {
            id: Uuid::new_v4(),
            category_id: None,
            event_type_id: None,
            record: EventRecord::new(qid),
        }
    }

    #[test]
    fn truncation_counts_characters() {
        let mut record = EventRecord::new("Q1");
        record.label = "é".repeat(600);
        record.description = "short".into();
        record.location.qid = Some("Q".repeat(30));
        record.sort_key = "1944-06-06T00:00:00Z-with-an-overlong-tail".into();

        let out = truncate_fields(&record);
        assert_eq!(out.label.chars().count(), MAX_TEXT);
        assert_eq!(out.description, "short");
        assert_eq!(out.location.qid.as_deref().map(str::len), Some(MAX_ENTITY_ID));
        assert_eq!(out.sort_key.len(), MAX_SORT_KEY);
    }

    #[test]
    fn filter_predicates() {
        let mut event = stored("Q1");
        event.record.article_url = Some("https://en.wikipedia.org/wiki/X".into());
        event.record.sort_key = "1944-06-06T00:00:00Z".into();

        assert!(EventFilter::all().matches(&event));
        assert!(EventFilter::needing_extracts(true).matches(&event));
        assert!(!EventFilter::all().with_ids(vec!["Q2".into()]).matches(&event));
        assert!(EventFilter::all().with_ids(vec![]).matches(&event));
        assert!(EventFilter::all()
            .in_date_range(Some("1939".into()), Some("1945".into()))
            .matches(&event));
        assert!(!EventFilter::all()
            .in_date_range(Some("1945".into()), None)
            .matches(&event));

        event.category_id = Some("Q362".into());
        assert!(!EventFilter::all().uncategorized(true).matches(&event));

        event.record.article_extract = Some("Text".into());
        assert!(!EventFilter::needing_extracts(true).matches(&event));
        assert!(EventFilter::needing_extracts(false).matches(&event));
    }
}
