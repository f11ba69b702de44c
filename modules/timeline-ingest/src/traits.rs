// Trait seams for the ingestion pipeline.
//
// KnowledgeGraph: the SPARQL endpoint (event rows, entity lookups, batched enrichment).
// EngagementSource: Wikimedia pageviews/backlinks and article summaries.
//
// Production impls wrap the wikidata-client types; tests use the mocks in
// `testing.rs`, so no network is needed to exercise the loader.

use std::collections::HashMap;

use async_trait::async_trait;
use wikidata_client::{
    BindingRow, CategoryProperties, CategoryQuery, Engagement, PeriodItem, Result,
    TypeDiscoveryQuery, WikidataClient, WikimediaClient,
};

// ---------------------------------------------------------------------------
// KnowledgeGraph
// ---------------------------------------------------------------------------

#[async_trait]
pub trait KnowledgeGraph: Send + Sync {
    /// Raw rows for a category-closure query.
    async fn category_rows(&self, query: &CategoryQuery) -> Result<Vec<BindingRow>>;

    /// Raw rows for a type-discovery query.
    async fn type_discovery_rows(&self, query: &TypeDiscoveryQuery) -> Result<Vec<BindingRow>>;

    async fn category_properties(&self, qid: &str) -> Result<CategoryProperties>;

    async fn item_label(&self, qid: &str) -> Result<Option<String>>;

    async fn items_by_time_period(&self, period_qid: &str, limit: u32) -> Result<Vec<PeriodItem>>;

    async fn coordinates(&self, location_qids: &[String]) -> Result<HashMap<String, (f64, f64)>>;

    async fn sitelink_counts(&self, qids: &[String]) -> Result<HashMap<String, u32>>;

    /// Direct-then-transitive "part of" ids per entity.
    async fn part_of(&self, qids: &[String]) -> Result<HashMap<String, Vec<String>>>;
}

#[async_trait]
impl KnowledgeGraph for WikidataClient {
    async fn category_rows(&self, query: &CategoryQuery) -> Result<Vec<BindingRow>> {
        WikidataClient::category_rows(self, query).await
    }

    async fn type_discovery_rows(&self, query: &TypeDiscoveryQuery) -> Result<Vec<BindingRow>> {
        WikidataClient::type_discovery_rows(self, query).await
    }

    async fn category_properties(&self, qid: &str) -> Result<CategoryProperties> {
        WikidataClient::category_properties(self, qid).await
    }

    async fn item_label(&self, qid: &str) -> Result<Option<String>> {
        WikidataClient::item_label(self, qid).await
    }

    async fn items_by_time_period(&self, period_qid: &str, limit: u32) -> Result<Vec<PeriodItem>> {
        WikidataClient::items_by_time_period(self, period_qid, limit).await
    }

    async fn coordinates(&self, location_qids: &[String]) -> Result<HashMap<String, (f64, f64)>> {
        WikidataClient::coordinates(self, location_qids).await
    }

    async fn sitelink_counts(&self, qids: &[String]) -> Result<HashMap<String, u32>> {
        WikidataClient::sitelink_counts(self, qids).await
    }

    async fn part_of(&self, qids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        WikidataClient::part_of(self, qids).await
    }
}

// ---------------------------------------------------------------------------
// EngagementSource
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EngagementSource: Send + Sync {
    /// Pageviews and backlinks for an article title; zeros when there is no title.
    async fn engagement(&self, title: Option<&str>) -> Result<Engagement>;

    /// Trimmed lead extract for an article URL, `None` when empty.
    async fn summary_extract(&self, article_url: &str) -> Result<Option<String>>;
}

#[async_trait]
impl EngagementSource for WikimediaClient {
    async fn engagement(&self, title: Option<&str>) -> Result<Engagement> {
        WikimediaClient::engagement(self, title).await
    }

    async fn summary_extract(&self, article_url: &str) -> Result<Option<String>> {
        WikimediaClient::summary_extract(self, article_url).await
    }
}
