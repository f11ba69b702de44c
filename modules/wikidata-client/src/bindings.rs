//! Typed access to SPARQL JSON result rows.
//!
//! Each query projects a fixed set of variables. [`Var`] names every variable
//! the crate's queries use, so field lookups are checked at compile time
//! instead of being matched on loose strings.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, WikidataError};

static ENTITY_URI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"entity/(Q\d+)$").unwrap());

/// Extract the `Q…` id from an entity URI such as `http://www.wikidata.org/entity/Q362`.
pub fn extract_entity_id(uri: &str) -> Option<String> {
    ENTITY_URI
        .captures(uri)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Article title from an encyclopedia URL: the path segment after `/wiki/`, fragment dropped.
pub fn article_title_from_url(url: &str) -> Option<String> {
    let (_, path) = url.split_once("/wiki/")?;
    let title = path.split('#').next().unwrap_or_default();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    Item,
    ItemLabel,
    ItemDescription,
    PointInTime,
    PointInTimePrecision,
    PointInTimeQualifier,
    PointInTimeSignificantEvent,
    StartTime,
    StartTimePrecision,
    StartTimeQualifier,
    EndTime,
    EndTimePrecision,
    EndTimeQualifier,
    DateOfBirth,
    DateOfBirthPrecision,
    DateOfDeath,
    DateOfDeathPrecision,
    LaunchTime,
    LaunchTimePrecision,
    LandingTime,
    LandingTimePrecision,
    Location,
    LocationLabel,
    Article,
    Sitelinks,
    Sitelink,
    PartOf,
    Category,
    Label,
    Lat,
    Lon,
    InstanceOf,
    InstanceOfLabel,
    SubclassOf,
    SubclassOfLabel,
}

impl Var {
    /// The variable name as written in query text (without `?`).
    pub fn name(&self) -> &'static str {
        match self {
            Var::Item => "item",
            Var::ItemLabel => "itemLabel",
            Var::ItemDescription => "itemDescription",
            Var::PointInTime => "point_in_time",
            Var::PointInTimePrecision => "point_in_time_precision",
            Var::PointInTimeQualifier => "point_in_time_q",
            Var::PointInTimeSignificantEvent => "point_in_time_p793",
            Var::StartTime => "start_time",
            Var::StartTimePrecision => "start_time_precision",
            Var::StartTimeQualifier => "start_time_q",
            Var::EndTime => "end_time",
            Var::EndTimePrecision => "end_time_precision",
            Var::EndTimeQualifier => "end_time_q",
            Var::DateOfBirth => "date_of_birth",
            Var::DateOfBirthPrecision => "date_of_birth_precision",
            Var::DateOfDeath => "date_of_death",
            Var::DateOfDeathPrecision => "date_of_death_precision",
            Var::LaunchTime => "launch_time",
            Var::LaunchTimePrecision => "launch_time_precision",
            Var::LandingTime => "landing_time",
            Var::LandingTimePrecision => "landing_time_precision",
            Var::Location => "location",
            Var::LocationLabel => "locationLabel",
            Var::Article => "article",
            Var::Sitelinks => "sitelinks",
            Var::Sitelink => "sitelink",
            Var::PartOf => "part_of",
            Var::Category => "cat",
            Var::Label => "label",
            Var::Lat => "lat",
            Var::Lon => "lon",
            Var::InstanceOf => "p31",
            Var::InstanceOfLabel => "p31Label",
            Var::SubclassOf => "p279",
            Var::SubclassOfLabel => "p279Label",
        }
    }

    /// `?name`, for splicing into query text.
    pub fn sparql(&self) -> String {
        format!("?{}", self.name())
    }
}

/// One result row: variable name to bound value. Unbound variables are absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingRow {
    values: HashMap<String, String>,
}

impl BindingRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used by tests and fixtures.
    pub fn with(mut self, var: Var, value: impl Into<String>) -> Self {
        self.values.insert(var.name().to_string(), value.into());
        self
    }

    pub fn get(&self, var: Var) -> Option<&str> {
        self.values
            .get(var.name())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn is_bound(&self, var: Var) -> bool {
        self.get(var).is_some()
    }

    /// Entity id parsed from an entity-URI variable.
    pub fn entity_id(&self, var: Var) -> Option<String> {
        self.get(var).and_then(extract_entity_id)
    }

    /// Time precision code; unparseable values are treated as absent.
    pub fn precision(&self, var: Var) -> Option<u8> {
        self.get(var).and_then(|v| v.trim().parse().ok())
    }

    pub fn count(&self, var: Var) -> Option<u32> {
        self.get(var).and_then(|v| v.trim().parse().ok())
    }

    pub fn float(&self, var: Var) -> Option<f64> {
        self.get(var).and_then(|v| v.trim().parse().ok())
    }
}

// --- SPARQL JSON results format ---

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, BoundValue>>,
}

#[derive(Debug, Deserialize)]
struct BoundValue {
    value: String,
}

/// Parse a `application/sparql-results+json` body into rows.
pub fn parse_results(body: &str) -> Result<Vec<BindingRow>> {
    let response: SparqlResponse = serde_json::from_str(body)
        .map_err(|e| WikidataError::Parse(format!("SPARQL results: {e}")))?;
    Ok(response
        .results
        .bindings
        .into_iter()
        .map(|row| BindingRow {
            values: row.into_iter().map(|(k, v)| (k, v.value)).collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_from_uris() {
        assert_eq!(
            extract_entity_id("http://www.wikidata.org/entity/Q362").as_deref(),
            Some("Q362")
        );
        assert_eq!(extract_entity_id("http://www.wikidata.org/entity/P361"), None);
        assert_eq!(extract_entity_id(""), None);
    }

    #[test]
    fn article_titles_from_urls() {
        assert_eq!(
            article_title_from_url("https://en.wikipedia.org/wiki/Battle_of_Midway").as_deref(),
            Some("Battle_of_Midway")
        );
        assert_eq!(
            article_title_from_url("https://en.wikipedia.org/wiki/Normandy#Landings").as_deref(),
            Some("Normandy")
        );
        assert_eq!(article_title_from_url("https://en.wikipedia.org/"), None);
        assert_eq!(article_title_from_url("https://en.wikipedia.org/wiki/"), None);
    }

    #[test]
    fn parses_results_json() {
        let body = r#"{
            "head": {"vars": ["item", "itemLabel", "point_in_time_precision", "sitelinks"]},
            "results": {"bindings": [
                {
                    "item": {"type": "uri", "value": "http://www.wikidata.org/entity/Q8676"},
                    "itemLabel": {"xml:lang": "en", "type": "literal", "value": "Battle of Midway"},
                    "point_in_time_precision": {"datatype": "http://www.w3.org/2001/XMLSchema#integer", "type": "literal", "value": "11"},
                    "sitelinks": {"type": "literal", "value": "71"}
                }
            ]}
        }"#;

        let rows = parse_results(body).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.entity_id(Var::Item).as_deref(), Some("Q8676"));
        assert_eq!(row.get(Var::ItemLabel), Some("Battle of Midway"));
        assert_eq!(row.precision(Var::PointInTimePrecision), Some(11));
        assert_eq!(row.count(Var::Sitelinks), Some(71));
        assert!(!row.is_bound(Var::Location));
    }

    #[test]
    fn malformed_body_is_parse_error() {
        assert!(matches!(parse_results("<html>"), Err(WikidataError::Parse(_))));
    }

    #[test]
    fn unparseable_numbers_are_absent() {
        let row = BindingRow::new()
            .with(Var::StartTimePrecision, "eleven")
            .with(Var::Lat, "48.8");
        assert_eq!(row.precision(Var::StartTimePrecision), None);
        assert_eq!(row.float(Var::Lat), Some(48.8));
    }
}
