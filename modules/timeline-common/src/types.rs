use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dates::record_sort_key;

/// Base URL for entity pages in the knowledge graph.
pub const ENTITY_PAGE_BASE: &str = "https://www.wikidata.org/wiki/";

/// Human-facing page URL for an external id.
pub fn entity_url(qid: &str) -> String {
    format!("{ENTITY_PAGE_BASE}{qid}")
}

/// True for well-formed knowledge-graph ids (`Q` followed by digits).
pub fn is_entity_id(value: &str) -> bool {
    value
        .strip_prefix('Q')
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
}

// --- Dates ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Resolution {
    /// Map a knowledge-graph time precision code onto a resolution.
    pub fn from_precision(code: u8) -> Option<Self> {
        match code {
            9 => Some(Self::Year),
            10 => Some(Self::Month),
            11 => Some(Self::Day),
            12 => Some(Self::Hour),
            13 => Some(Self::Minute),
            14 => Some(Self::Second),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized date: canonical value plus the granularity it is known to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateField {
    pub value: String,
    pub resolution: Resolution,
}

impl DateField {
    pub fn new(value: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            value: value.into(),
            resolution,
        }
    }
}

// --- Location ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub qid: Option<String>,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

// --- Event ---

/// One historical event, built fresh per ingestion pass and upserted on `external_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub external_id: String,
    pub label: String,
    pub description: String,
    pub point_in_time: Option<DateField>,
    pub start_time: Option<DateField>,
    pub end_time: Option<DateField>,
    pub location: Location,
    pub external_url: Option<String>,
    pub article_url: Option<String>,
    pub article_title: Option<String>,
    pub article_extract: Option<String>,
    pub sitelink_count: u32,
    pub pageviews_30d: u64,
    pub backlink_count: u32,
    /// Parent "part of" ids, first-seen order, never containing `external_id`.
    pub part_of_ids: Vec<String>,
    pub sort_key: String,
    pub importance_score: Option<f64>,
}

impl EventRecord {
    pub fn new(external_id: impl Into<String>) -> Self {
        let external_id = external_id.into();
        Self {
            external_url: Some(entity_url(&external_id)),
            external_id,
            ..Default::default()
        }
    }

    /// Recompute `sort_key` from the current date fields.
    pub fn refresh_sort_key(&mut self) {
        self.sort_key = record_sort_key(
            self.start_time.as_ref(),
            self.point_in_time.as_ref(),
            self.end_time.as_ref(),
        );
    }

    /// Label when present, else the external id. Used when reporting failures.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.external_id
        } else {
            &self.label
        }
    }
}

/// Order events ascending by sort key with dateless events last. Stable.
pub fn sort_chronologically(events: &mut [EventRecord]) {
    events.sort_by(|a, b| {
        (a.sort_key.is_empty(), a.sort_key.as_str()).cmp(&(b.sort_key.is_empty(), b.sort_key.as_str()))
    });
}

// --- Categories and types ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub qid: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub external_id: String,
    pub name: String,
    pub instance_of: Vec<EntityRef>,
    pub subclass_of: Vec<EntityRef>,
}

impl CategoryRecord {
    pub fn url(&self) -> String {
        entity_url(&self.external_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTypeRecord {
    pub external_id: String,
    pub name: String,
}

// --- Batch progress ---

/// Identifies one `(type, year-range)` chunk of a catalog ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub type_id: String,
    pub year_start: i32,
    pub year_end: i32,
}

impl std::fmt::Display for BatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..={}]", self.type_id, self.year_start, self.year_end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub last_updated_at: DateTime<Utc>,
    pub events_created: u32,
    pub error_count: u32,
}

// --- Enrichment failures ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOperation {
    PageviewsBacklinks,
    Coordinates,
    SitelinkCounts,
    Summary,
}

impl std::fmt::Display for FetchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchOperation::PageviewsBacklinks => write!(f, "pageviews/backlinks"),
            FetchOperation::Coordinates => write!(f, "coordinates"),
            FetchOperation::SitelinkCounts => write!(f, "sitelinks"),
            FetchOperation::Summary => write!(f, "summary"),
        }
    }
}

/// A captured per-item enrichment failure. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub identifier: String,
    pub operation: FetchOperation,
    pub message: String,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.identifier, self.operation, self.message)
    }
}
