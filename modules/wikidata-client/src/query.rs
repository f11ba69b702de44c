//! SPARQL text construction. No I/O here.
//!
//! Entity ids are spliced into query text verbatim; callers validate them
//! with [`timeline_common::is_entity_id`] first.

use crate::bindings::Var;

/// Max identifiers per `VALUES` clause.
pub const BATCH_SIZE: usize = 50;

const PREFIXES: &str = "\
PREFIX schema: <http://schema.org/>
PREFIX wd: <http://www.wikidata.org/entity/>
PREFIX wdt: <http://www.wikidata.org/prop/direct/>
PREFIX p: <http://www.wikidata.org/prop/>
PREFIX pq: <http://www.wikidata.org/prop/qualifier/>
PREFIX pqv: <http://www.wikidata.org/prop/qualifier/value/>
PREFIX psv: <http://www.wikidata.org/prop/statement/value/>
PREFIX wikibase: <http://wikiba.se/ontology#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
";

/// Date candidates for category mode, in coalesce priority.
const CATEGORY_DATE_VARS: [Var; 9] = [
    Var::StartTime,
    Var::StartTimeQualifier,
    Var::DateOfBirth,
    Var::PointInTime,
    Var::PointInTimeQualifier,
    Var::PointInTimeSignificantEvent,
    Var::EndTime,
    Var::EndTimeQualifier,
    Var::DateOfDeath,
];

/// Date candidates for type discovery, in coalesce priority.
const TYPE_DATE_VARS: [Var; 5] = [
    Var::StartTime,
    Var::PointInTime,
    Var::EndTime,
    Var::LaunchTime,
    Var::LandingTime,
];

/// Inclusive year bounds. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YearRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

impl YearRange {
    pub fn new(start: Option<i32>, end: Option<i32>) -> Self {
        Self { start, end }
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryQuery {
    pub category_qid: String,
    pub years: YearRange,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDiscoveryQuery {
    pub type_qids: Vec<String>,
    pub years: YearRange,
    pub min_sitelinks: u32,
    pub limit: u32,
}

fn coalesce(vars: &[Var]) -> String {
    let names: Vec<String> = vars.iter().map(Var::sparql).collect();
    format!("COALESCE({})", names.join(", "))
}

fn any_bound(vars: &[Var]) -> String {
    let checks: Vec<String> = vars.iter().map(|v| format!("BOUND({})", v.sparql())).collect();
    format!("({})", checks.join(" || "))
}

/// `FILTER(...)` restricting the coalesced date to a year range, or empty
/// when the range is open on both sides. Requires at least one bound date so
/// dateless entities never slip through a year filter.
pub fn year_filter(vars: &[Var], years: YearRange) -> String {
    if !years.is_bounded() {
        return String::new();
    }
    let date = coalesce(vars);
    let mut parts = vec![any_bound(vars)];
    if let Some(start) = years.start {
        parts.push(format!("(YEAR({date}) >= {start})"));
    }
    if let Some(end) = years.end {
        parts.push(format!("(YEAR({date}) <= {end})"));
    }
    format!("FILTER({})", parts.join(" && "))
}

/// Keep entities with at least one day-precision date. Qualifier and
/// alternate-property dates pass regardless of precision.
fn day_precision_filter() -> String {
    let precise: Vec<String> = [
        Var::PointInTimePrecision,
        Var::StartTimePrecision,
        Var::EndTimePrecision,
        Var::DateOfBirthPrecision,
        Var::DateOfDeathPrecision,
    ]
    .iter()
    .map(|v| format!("{} = 11", v.sparql()))
    .collect();
    let loose: Vec<String> = [
        Var::PointInTimeQualifier,
        Var::StartTimeQualifier,
        Var::EndTimeQualifier,
        Var::PointInTimeSignificantEvent,
        Var::DateOfBirth,
        Var::DateOfDeath,
    ]
    .iter()
    .map(|v| format!("BOUND({})", v.sparql()))
    .collect();
    format!("FILTER({} || {})", precise.join(" || "), loose.join(" || "))
}

/// `wd:Q1 wd:Q2 ...` for a `VALUES` block.
pub fn values_clause(qids: &[String]) -> String {
    qids.iter()
        .map(|q| format!("wd:{q}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split identifiers into `VALUES`-sized batches.
pub fn batches(qids: &[String]) -> std::slice::Chunks<'_, String> {
    qids.chunks(BATCH_SIZE)
}

fn statement_time(property: &str, value: Var, precision: Var) -> String {
    format!(
        "OPTIONAL {{ ?item p:{property}/psv:{property} [wikibase:timeValue {}; wikibase:timePrecision {}] . }}",
        value.sparql(),
        precision.sparql()
    )
}

/// Events in a category: transitive "part of", instance of a transitive
/// subclass, or whose time period is part of the category.
pub fn category_query(q: &CategoryQuery) -> String {
    let cat = &q.category_qid;
    let select: Vec<String> = [
        Var::Item,
        Var::ItemLabel,
        Var::ItemDescription,
        Var::PointInTime,
        Var::StartTime,
        Var::EndTime,
        Var::PointInTimePrecision,
        Var::StartTimePrecision,
        Var::EndTimePrecision,
        Var::PointInTimeQualifier,
        Var::StartTimeQualifier,
        Var::EndTimeQualifier,
        Var::PointInTimeSignificantEvent,
        Var::DateOfBirth,
        Var::DateOfBirthPrecision,
        Var::DateOfDeath,
        Var::DateOfDeathPrecision,
        Var::Location,
        Var::LocationLabel,
        Var::Article,
        Var::PartOf,
    ]
    .iter()
    .map(Var::sparql)
    .collect();

    format!(
        r#"{PREFIXES}
SELECT DISTINCT {select}
WHERE {{
  {{
    ?item wdt:P361* wd:{cat} .
  }} UNION {{
    ?item wdt:P31 ?type .
    ?type wdt:P279* wd:{cat} .
  }} UNION {{
    ?item wdt:P2348 ?period .
    ?period wdt:P361* wd:{cat} .
  }}
  {pit}
  {start}
  {end}
  OPTIONAL {{ ?item p:P361/pq:P585 ?point_in_time_q . }}
  OPTIONAL {{ ?item p:P361/pq:P580 ?start_time_q . }}
  OPTIONAL {{ ?item p:P361/pq:P582 ?end_time_q . }}
  OPTIONAL {{ ?item p:P793/pqv:P585 [wikibase:timeValue ?point_in_time_p793] . }}
  {birth}
  {death}
  OPTIONAL {{ ?item wdt:P276 ?location . }}
  OPTIONAL {{ ?item wdt:P361 ?part_of . }}
  OPTIONAL {{
    ?article schema:about ?item .
    ?article schema:inLanguage "en" .
    ?article schema:isPartOf <https://en.wikipedia.org/> .
  }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
  {day_filter}
  {year_filter}
}}
ORDER BY DESC({bound}) ASC({date})
LIMIT {limit}
"#,
        select = select.join(" "),
        pit = statement_time("P585", Var::PointInTime, Var::PointInTimePrecision),
        start = statement_time("P580", Var::StartTime, Var::StartTimePrecision),
        end = statement_time("P582", Var::EndTime, Var::EndTimePrecision),
        birth = statement_time("P569", Var::DateOfBirth, Var::DateOfBirthPrecision),
        death = statement_time("P570", Var::DateOfDeath, Var::DateOfDeathPrecision),
        day_filter = day_precision_filter(),
        year_filter = year_filter(&CATEGORY_DATE_VARS, q.years),
        bound = any_bound(&CATEGORY_DATE_VARS),
        date = coalesce(&CATEGORY_DATE_VARS),
        limit = q.limit,
    )
}

/// Notable events that are instances of any of the given types and have an
/// English encyclopedia article.
pub fn type_discovery_query(q: &TypeDiscoveryQuery) -> String {
    format!(
        r#"{PREFIXES}
SELECT DISTINCT ?item ?itemLabel ?itemDescription
  ?point_in_time ?point_in_time_precision
  ?start_time ?start_time_precision
  ?end_time ?end_time_precision
  ?launch_time ?launch_time_precision
  ?landing_time ?landing_time_precision
  ?location ?locationLabel ?article ?sitelinks ?part_of
WHERE {{
  VALUES ?type {{ {values} }}
  ?item wdt:P31/wdt:P279* ?type .
  ?item wikibase:sitelinks ?sitelinks .
  FILTER(?sitelinks >= {min_sitelinks})
  ?article schema:about ?item .
  ?article schema:inLanguage "en" .
  ?article schema:isPartOf <https://en.wikipedia.org/> .
  {pit}
  {start}
  {end}
  {launch}
  {landing}
  OPTIONAL {{ ?item wdt:P276 ?location . }}
  OPTIONAL {{ ?item wdt:P361 ?part_of . }}
  FILTER{bound}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
  {year_filter}
}}
ORDER BY DESC(?sitelinks) ASC({date})
LIMIT {limit}
"#,
        values = values_clause(&q.type_qids),
        min_sitelinks = q.min_sitelinks,
        pit = statement_time("P585", Var::PointInTime, Var::PointInTimePrecision),
        start = statement_time("P580", Var::StartTime, Var::StartTimePrecision),
        end = statement_time("P582", Var::EndTime, Var::EndTimePrecision),
        launch = statement_time("P619", Var::LaunchTime, Var::LaunchTimePrecision),
        landing = statement_time("P620", Var::LandingTime, Var::LandingTimePrecision),
        bound = any_bound(&TYPE_DATE_VARS),
        year_filter = year_filter(&TYPE_DATE_VARS, q.years),
        date = coalesce(&TYPE_DATE_VARS),
        limit = q.limit,
    )
}

/// English label plus `instance of` and `subclass of` (with labels) of one entity.
pub fn category_properties_query(qid: &str) -> String {
    format!(
        r#"{PREFIXES}
SELECT ?label ?p31 ?p31Label ?p279 ?p279Label
WHERE {{
  wd:{qid} rdfs:label ?label .
  FILTER(LANG(?label) = "en")
  OPTIONAL {{
    wd:{qid} wdt:P31 ?p31 .
    ?p31 rdfs:label ?p31Label .
    FILTER(LANG(?p31Label) = "en")
  }}
  OPTIONAL {{
    wd:{qid} wdt:P279 ?p279 .
    ?p279 rdfs:label ?p279Label .
    FILTER(LANG(?p279Label) = "en")
  }}
}}
"#
    )
}

pub fn item_label_query(qid: &str) -> String {
    format!(
        r#"{PREFIXES}
SELECT ?label
WHERE {{
  wd:{qid} rdfs:label ?label .
  FILTER(LANG(?label) = "en")
}}
LIMIT 1
"#
    )
}

/// Entities whose time period (P2348) is the given period.
pub fn time_period_items_query(period_qid: &str, limit: u32) -> String {
    format!(
        r#"{PREFIXES}
SELECT DISTINCT ?item ?itemLabel
WHERE {{
  ?item wdt:P2348 wd:{period_qid} .
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}
LIMIT {limit}
"#
    )
}

pub fn coordinates_query(location_qids: &[String]) -> String {
    format!(
        r#"{PREFIXES}
SELECT ?location ?lat ?lon
WHERE {{
  VALUES ?location {{ {values} }}
  ?location p:P625/psv:P625 [
    wikibase:geoLatitude ?lat ;
    wikibase:geoLongitude ?lon
  ] .
}}
"#,
        values = values_clause(location_qids)
    )
}

/// One row per (item, sitelink); items without sitelinks appear once unbound.
pub fn sitelink_count_query(qids: &[String]) -> String {
    format!(
        r#"{PREFIXES}
SELECT ?item ?sitelink
WHERE {{
  VALUES ?item {{ {values} }}
  OPTIONAL {{ ?sitelink schema:about ?item . }}
}}
"#,
        values = values_clause(qids)
    )
}

pub fn part_of_direct_query(qids: &[String]) -> String {
    format!(
        r#"{PREFIXES}
SELECT ?item ?cat
WHERE {{
  VALUES ?item {{ {values} }}
  ?item wdt:P361 ?cat .
}}
"#,
        values = values_clause(qids)
    )
}

pub fn part_of_transitive_query(qids: &[String]) -> String {
    format!(
        r#"{PREFIXES}
SELECT ?item ?cat
WHERE {{
  VALUES ?item {{ {values} }}
  ?item wdt:P361* ?cat .
}}
"#,
        values = values_clause(qids)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(years: YearRange) -> String {
        category_query(&CategoryQuery {
            category_qid: "Q362".into(),
            years,
            limit: 50,
        })
    }

    #[test]
    fn category_query_unions_three_paths() {
        let q = category(YearRange::default());
        assert!(q.contains("?item wdt:P361* wd:Q362 ."));
        assert!(q.contains("?type wdt:P279* wd:Q362 ."));
        assert!(q.contains("?period wdt:P361* wd:Q362 ."));
        assert_eq!(q.matches("UNION").count(), 2);
        assert!(q.contains("LIMIT 50"));
    }

    #[test]
    fn no_year_filter_without_bounds() {
        let q = category(YearRange::default());
        assert!(!q.contains("YEAR("));
    }

    #[test]
    fn year_filter_requires_a_bound_date() {
        let q = category(YearRange::new(Some(1939), Some(1945)));
        assert!(q.contains("(YEAR(COALESCE(?start_time, ?start_time_q, ?date_of_birth, ?point_in_time, ?point_in_time_q, ?point_in_time_p793, ?end_time, ?end_time_q, ?date_of_death)) >= 1939)"));
        assert!(q.contains(">= 1939)"));
        assert!(q.contains("<= 1945)"));
        assert!(q.contains("FILTER((BOUND(?start_time) || "));
    }

    #[test]
    fn year_filter_with_one_side() {
        let filter = year_filter(&TYPE_DATE_VARS, YearRange::new(None, Some(-200)));
        assert!(filter.starts_with("FILTER((BOUND(?start_time)"));
        assert!(filter.contains("<= -200)"));
        assert!(!filter.contains(">="));
    }

    #[test]
    fn category_query_has_day_precision_gate_with_qualifier_loophole() {
        let q = category(YearRange::default());
        assert!(q.contains("?point_in_time_precision = 11 || ?start_time_precision = 11"));
        assert!(q.contains("BOUND(?point_in_time_q) || BOUND(?start_time_q) || BOUND(?end_time_q)"));
    }

    #[test]
    fn category_query_orders_dated_first() {
        let q = category(YearRange::default());
        assert!(q.contains("ORDER BY DESC((BOUND(?start_time) ||"));
        assert!(q.contains("ASC(COALESCE(?start_time, "));
    }

    #[test]
    fn type_discovery_query_shape() {
        let q = type_discovery_query(&TypeDiscoveryQuery {
            type_qids: vec!["Q178561".into(), "Q198".into()],
            years: YearRange::new(Some(1800), None),
            min_sitelinks: 20,
            limit: 500,
        });
        assert!(q.contains("VALUES ?type { wd:Q178561 wd:Q198 }"));
        assert!(q.contains("FILTER(?sitelinks >= 20)"));
        assert!(q.contains("?article schema:inLanguage \"en\" ."));
        assert!(q.contains("p:P619/psv:P619"));
        assert!(q.contains(">= 1800)"));
        assert!(q.contains("ORDER BY DESC(?sitelinks)"));
        assert!(q.contains("LIMIT 500"));
        assert!(!q.contains("precision = 11"));
    }

    #[test]
    fn batches_hold_at_most_fifty() {
        let ids: Vec<String> = (1..=120).map(|n| format!("Q{n}")).collect();
        let sizes: Vec<usize> = batches(&ids).map(<[String]>::len).collect();
        assert_eq!(sizes, vec![50, 50, 20]);

        let q = coordinates_query(&ids[..2]);
        assert!(q.contains("VALUES ?location { wd:Q1 wd:Q2 }"));
    }

    #[test]
    fn part_of_queries_differ_in_closure() {
        let ids = vec!["Q8676".to_string()];
        assert!(part_of_direct_query(&ids).contains("?item wdt:P361 ?cat ."));
        assert!(part_of_transitive_query(&ids).contains("?item wdt:P361* ?cat ."));
    }

    #[test]
    fn time_period_query_filters_on_period_and_limits() {
        let q = time_period_items_query("Q11759", 500);
        assert!(q.contains("?item wdt:P2348 wd:Q11759 ."));
        assert!(q.contains("SELECT DISTINCT ?item ?itemLabel"));
        assert!(q.trim_end().ends_with("LIMIT 500"));
    }
}
