use std::collections::{HashMap, HashSet};
use std::time::Duration;

use timeline_common::{is_entity_id, Config, EntityRef};
use tracing::{debug, info};

use crate::bindings::{parse_results, BindingRow, Var};
use crate::error::{check_status, Result};
use crate::query::{self, batches, CategoryQuery, TypeDiscoveryQuery};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::{CategoryProperties, PeriodItem};

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// Client for the public SPARQL endpoint. Every request goes through the
/// retry executor.
pub struct WikidataClient {
    http: reqwest::Client,
    endpoint: String,
    retry: RetryExecutor,
}

impl WikidataClient {
    pub fn new(endpoint: impl Into<String>, user_agent: &str, retry: RetryExecutor) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            retry,
        })
    }

    /// `SPARQL_MAX_RETRIES` counts retries, so the attempt budget is one more.
    pub fn from_config(config: &Config) -> Result<Self> {
        let policy = RetryPolicy::new(config.sparql_max_retries + 1, config.sparql_default_retry);
        Self::new(
            config.sparql_url.clone(),
            &config.user_agent(),
            RetryExecutor::new(policy),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run a SELECT query and return its rows.
    pub async fn select(&self, operation: &str, sparql: &str) -> Result<Vec<BindingRow>> {
        let rows = self.retry.run(operation, || self.execute(sparql)).await?;
        debug!(operation, rows = rows.len(), "SPARQL query returned");
        Ok(rows)
    }

    async fn execute(&self, sparql: &str) -> Result<Vec<BindingRow>> {
        let resp = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", sparql)])
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        parse_results(&body)
    }

    // --- Event queries ---

    pub async fn category_rows(&self, q: &CategoryQuery) -> Result<Vec<BindingRow>> {
        info!(
            category = %q.category_qid,
            start_year = ?q.years.start,
            end_year = ?q.years.end,
            limit = q.limit,
            "Querying category events"
        );
        let rows = self.select("category query", &query::category_query(q)).await?;
        info!(rows = rows.len(), "Retrieved category bindings");
        Ok(rows)
    }

    pub async fn type_discovery_rows(&self, q: &TypeDiscoveryQuery) -> Result<Vec<BindingRow>> {
        info!(
            types = q.type_qids.len(),
            start_year = ?q.years.start,
            end_year = ?q.years.end,
            min_sitelinks = q.min_sitelinks,
            limit = q.limit,
            "Querying events by type"
        );
        let rows = self
            .select("type discovery query", &query::type_discovery_query(q))
            .await?;
        info!(rows = rows.len(), "Retrieved type discovery bindings");
        Ok(rows)
    }

    // --- Entity lookups ---

    /// Invalid ids yield empty properties without a request.
    pub async fn category_properties(&self, qid: &str) -> Result<CategoryProperties> {
        if !is_entity_id(qid) {
            return Ok(CategoryProperties::default());
        }
        let rows = self
            .select("category properties", &query::category_properties_query(qid))
            .await?;
        Ok(category_properties_from_rows(&rows))
    }

    pub async fn item_label(&self, qid: &str) -> Result<Option<String>> {
        if !is_entity_id(qid) {
            return Ok(None);
        }
        let rows = self.select("item label", &query::item_label_query(qid)).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(Var::Label))
            .map(str::to_string))
    }

    pub async fn items_by_time_period(&self, period_qid: &str, limit: u32) -> Result<Vec<PeriodItem>> {
        if !is_entity_id(period_qid) {
            return Ok(Vec::new());
        }
        let rows = self
            .select(
                "time period items",
                &query::time_period_items_query(period_qid, limit),
            )
            .await?;
        Ok(period_items_from_rows(&rows))
    }

    // --- Batched enrichment lookups ---

    /// Latitude/longitude per location id. Locations without coordinates are absent.
    pub async fn coordinates(&self, location_qids: &[String]) -> Result<HashMap<String, (f64, f64)>> {
        let ids = valid_unique(location_qids);
        let mut result = HashMap::new();
        for batch in batches(&ids) {
            let rows = self
                .select("coordinates", &query::coordinates_query(batch))
                .await?;
            result.extend(coordinates_from_rows(&rows));
        }
        Ok(result)
    }

    /// Sitelink count per id; every requested id is present, defaulting to 0.
    pub async fn sitelink_counts(&self, qids: &[String]) -> Result<HashMap<String, u32>> {
        let ids = valid_unique(qids);
        let mut result: HashMap<String, u32> = qids.iter().map(|q| (q.clone(), 0)).collect();
        for batch in batches(&ids) {
            let rows = self
                .select("sitelink counts", &query::sitelink_count_query(batch))
                .await?;
            result.extend(sitelink_counts_from_rows(&rows));
        }
        Ok(result)
    }

    /// "Part of" closure per id: direct parents first, then the remaining
    /// transitive ancestors. Every requested id is present.
    pub async fn part_of(&self, qids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let ids = valid_unique(qids);
        let mut result: HashMap<String, Vec<String>> =
            qids.iter().map(|q| (q.clone(), Vec::new())).collect();
        for batch in batches(&ids) {
            let direct = self
                .select("part of (direct)", &query::part_of_direct_query(batch))
                .await?;
            let transitive = self
                .select("part of (transitive)", &query::part_of_transitive_query(batch))
                .await?;
            result.extend(merge_part_of(batch, &direct, &transitive));
        }
        Ok(result)
    }
}

fn valid_unique(qids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for qid in qids {
        if is_entity_id(qid) && seen.insert(qid.as_str()) {
            unique.push(qid.clone());
        }
    }
    unique
}

// --- Row interpretation ---

pub fn category_properties_from_rows(rows: &[BindingRow]) -> CategoryProperties {
    let mut props = CategoryProperties::default();
    let mut seen_instance = HashSet::new();
    let mut seen_subclass = HashSet::new();
    for row in rows {
        if props.label.is_empty() {
            if let Some(label) = row.get(Var::Label) {
                props.label = label.to_string();
            }
        }
        if let Some(qid) = row.entity_id(Var::InstanceOf) {
            if seen_instance.insert(qid.clone()) {
                props.instance_of.push(EntityRef {
                    qid,
                    label: row.get(Var::InstanceOfLabel).unwrap_or_default().to_string(),
                });
            }
        }
        if let Some(qid) = row.entity_id(Var::SubclassOf) {
            if seen_subclass.insert(qid.clone()) {
                props.subclass_of.push(EntityRef {
                    qid,
                    label: row.get(Var::SubclassOfLabel).unwrap_or_default().to_string(),
                });
            }
        }
    }
    props
}

pub fn period_items_from_rows(rows: &[BindingRow]) -> Vec<PeriodItem> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| {
            let qid = row.entity_id(Var::Item)?;
            if !seen.insert(qid.clone()) {
                return None;
            }
            let label = row.get(Var::ItemLabel).unwrap_or(qid.as_str()).to_string();
            Some(PeriodItem { qid, label })
        })
        .collect()
}

pub fn coordinates_from_rows(rows: &[BindingRow]) -> HashMap<String, (f64, f64)> {
    rows.iter()
        .filter_map(|row| {
            let qid = row.entity_id(Var::Location)?;
            Some((qid, (row.float(Var::Lat)?, row.float(Var::Lon)?)))
        })
        .collect()
}

/// Counts distinct sitelinks per item; rows with an unbound sitelink add nothing.
pub fn sitelink_counts_from_rows(rows: &[BindingRow]) -> HashMap<String, u32> {
    let mut seen: HashMap<String, HashSet<&str>> = HashMap::new();
    for row in rows {
        let Some(qid) = row.entity_id(Var::Item) else {
            continue;
        };
        let links = seen.entry(qid).or_default();
        if let Some(link) = row.get(Var::Sitelink) {
            links.insert(link);
        }
    }
    seen.into_iter()
        .map(|(qid, links)| (qid, links.len() as u32))
        .collect()
}

fn pairs(rows: &[BindingRow]) -> impl Iterator<Item = (String, String)> + '_ {
    rows.iter()
        .filter_map(|row| Some((row.entity_id(Var::Item)?, row.entity_id(Var::Category)?)))
}

/// Direct parents in result order, then transitive ancestors not already
/// listed. An entity is never its own ancestor.
pub fn merge_part_of(
    batch: &[String],
    direct: &[BindingRow],
    transitive: &[BindingRow],
) -> HashMap<String, Vec<String>> {
    let mut merged: HashMap<String, Vec<String>> =
        batch.iter().map(|q| (q.clone(), Vec::new())).collect();
    for (item, cat) in pairs(direct).chain(pairs(transitive)) {
        if item == cat {
            continue;
        }
        if let Some(list) = merged.get_mut(&item) {
            if !list.contains(&cat) {
                list.push(cat);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(qid: &str) -> String {
        format!("http://www.wikidata.org/entity/{qid}")
    }

    fn link(item: &str, cat: &str) -> BindingRow {
        BindingRow::new()
            .with(Var::Item, entity(item))
            .with(Var::Category, entity(cat))
    }

    #[test]
    fn category_properties_dedupe_classifications() {
        let rows = vec![
            BindingRow::new()
                .with(Var::Label, "World War II")
                .with(Var::InstanceOf, entity("Q103495"))
                .with(Var::InstanceOfLabel, "world war"),
            BindingRow::new()
                .with(Var::Label, "World War II")
                .with(Var::InstanceOf, entity("Q103495"))
                .with(Var::InstanceOfLabel, "world war")
                .with(Var::SubclassOf, entity("Q198")),
        ];

        let props = category_properties_from_rows(&rows);
        assert_eq!(props.label, "World War II");
        assert_eq!(
            props.instance_of,
            vec![EntityRef {
                qid: "Q103495".into(),
                label: "world war".into()
            }]
        );
        assert_eq!(props.subclass_of.len(), 1);
        assert_eq!(props.subclass_of[0].label, "");
    }

    #[test]
    fn sitelinks_count_distinct_links_and_zero_for_unbound() {
        let rows = vec![
            BindingRow::new()
                .with(Var::Item, entity("Q1"))
                .with(Var::Sitelink, "https://en.wikipedia.org/wiki/A"),
            BindingRow::new()
                .with(Var::Item, entity("Q1"))
                .with(Var::Sitelink, "https://fr.wikipedia.org/wiki/A"),
            BindingRow::new()
                .with(Var::Item, entity("Q1"))
                .with(Var::Sitelink, "https://fr.wikipedia.org/wiki/A"),
            BindingRow::new().with(Var::Item, entity("Q2")),
        ];

        let counts = sitelink_counts_from_rows(&rows);
        assert_eq!(counts["Q1"], 2);
        assert_eq!(counts["Q2"], 0);
    }

    #[test]
    fn coordinates_skip_unparseable_values() {
        let rows = vec![
            BindingRow::new()
                .with(Var::Location, entity("Q90"))
                .with(Var::Lat, "48.8567")
                .with(Var::Lon, "2.3508"),
            BindingRow::new()
                .with(Var::Location, entity("Q64"))
                .with(Var::Lat, "north")
                .with(Var::Lon, "13.38"),
        ];

        let coords = coordinates_from_rows(&rows);
        assert_eq!(coords.get("Q90"), Some(&(48.8567, 2.3508)));
        assert!(!coords.contains_key("Q64"));
    }

    #[test]
    fn part_of_lists_direct_parents_first_and_excludes_self() {
        let batch = vec!["Q8676".to_string(), "Q5".to_string()];
        let direct = vec![link("Q8676", "Q1053446")];
        let transitive = vec![
            link("Q8676", "Q8676"),
            link("Q8676", "Q362"),
            link("Q8676", "Q1053446"),
            link("Q5", "Q5"),
        ];

        let merged = merge_part_of(&batch, &direct, &transitive);
        assert_eq!(merged["Q8676"], vec!["Q1053446".to_string(), "Q362".to_string()]);
        assert!(merged["Q5"].is_empty());
    }

    #[test]
    fn period_items_fall_back_to_id_label() {
        let rows = vec![
            BindingRow::new()
                .with(Var::Item, entity("Q10"))
                .with(Var::ItemLabel, "Siege of Orléans"),
            BindingRow::new().with(Var::Item, entity("Q11")),
            BindingRow::new().with(Var::Item, entity("Q10")),
        ];

        let items = period_items_from_rows(&rows);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].label, "Q11");
    }

    #[test]
    fn invalid_ids_are_dropped_before_batching() {
        let ids = vec!["Q1".into(), "P31".into(), "Q1".into(), "".into(), "Q2".into()];
        assert_eq!(valid_unique(&ids), vec!["Q1".to_string(), "Q2".to_string()]);
    }

    #[tokio::test]
    async fn invalid_category_id_needs_no_request() {
        let client = WikidataClient::new(
            "http://127.0.0.1:9/sparql",
            "test-agent",
            RetryExecutor::new(RetryPolicy::new(1, Duration::ZERO)),
        )
        .unwrap();

        let props = client.category_properties("not-an-id").await.unwrap();
        assert_eq!(props, CategoryProperties::default());
        assert_eq!(client.item_label("P31").await.unwrap(), None);
        assert!(client.items_by_time_period("1400s", 500).await.unwrap().is_empty());
    }
}
