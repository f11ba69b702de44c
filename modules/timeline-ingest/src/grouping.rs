//! Collapse flat SPARQL rows into one [`EventRecord`] per entity.
//!
//! Optional query paths multiply rows: an entity with two locations and three
//! "part of" parents comes back as six rows. Each logical field is picked from
//! a fixed priority list of candidate columns, scanning the entity's rows in
//! result order and taking the first bound value together with the precision
//! from the same row.

use std::collections::HashMap;

use timeline_common::{normalize_date, DateField, EventRecord, Location};
use wikidata_client::{article_title_from_url, BindingRow, Var};

/// A candidate source column and the precision column that qualifies it.
type Candidate = (Var, Option<Var>);

const POINT_IN_TIME: &[Candidate] = &[
    (Var::PointInTime, Some(Var::PointInTimePrecision)),
    (Var::PointInTimeQualifier, None),
    (Var::PointInTimeSignificantEvent, None),
    (Var::LaunchTime, Some(Var::LaunchTimePrecision)),
];

const START_TIME: &[Candidate] = &[
    (Var::StartTime, Some(Var::StartTimePrecision)),
    (Var::StartTimeQualifier, None),
    (Var::DateOfBirth, Some(Var::DateOfBirthPrecision)),
    (Var::LaunchTime, Some(Var::LaunchTimePrecision)),
];

const END_TIME: &[Candidate] = &[
    (Var::EndTime, Some(Var::EndTimePrecision)),
    (Var::EndTimeQualifier, None),
    (Var::DateOfDeath, Some(Var::DateOfDeathPrecision)),
    (Var::LandingTime, Some(Var::LandingTimePrecision)),
];

/// Group rows by entity id, first-appearance order. Rows without an entity
/// id are dropped.
pub fn group_rows(rows: &[BindingRow]) -> Vec<EventRecord> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Vec<&BindingRow>> = HashMap::new();
    for row in rows {
        let Some(qid) = row.entity_id(Var::Item) else {
            continue;
        };
        by_id
            .entry(qid.clone())
            .or_insert_with(|| {
                order.push(qid);
                Vec::new()
            })
            .push(row);
    }

    order
        .into_iter()
        .filter_map(|qid| {
            let entity_rows = by_id.remove(&qid)?;
            Some(build_record(qid, &entity_rows))
        })
        .collect()
}

fn build_record(qid: String, rows: &[&BindingRow]) -> EventRecord {
    let mut record = EventRecord::new(qid);
    let Some(first) = rows.first() else {
        return record;
    };

    record.label = first.get(Var::ItemLabel).unwrap_or_default().to_string();
    record.description = first.get(Var::ItemDescription).unwrap_or_default().to_string();
    record.point_in_time = pick_date(rows, POINT_IN_TIME);
    record.start_time = pick_date(rows, START_TIME);
    record.end_time = pick_date(rows, END_TIME);
    record.location = pick_location(rows);
    record.part_of_ids = collect_part_of(rows, &record.external_id);
    record.sitelink_count = first.count(Var::Sitelinks).unwrap_or(0);
    record.article_url = first.get(Var::Article).map(str::to_string);
    record.article_title = record.article_url.as_deref().and_then(article_title_from_url);
    record.refresh_sort_key();
    record
}

/// First bound candidate across rows (row-major), normalized with the
/// precision from the same row.
fn pick_date(rows: &[&BindingRow], candidates: &[Candidate]) -> Option<DateField> {
    rows.iter().find_map(|row| {
        candidates.iter().find_map(|(value, precision)| {
            let raw = row.get(*value)?;
            let code = precision.and_then(|p| row.precision(p));
            Some((raw, code))
        })
    })
    .and_then(|(raw, code)| normalize_date(raw, code))
}

fn pick_location(rows: &[&BindingRow]) -> Location {
    rows.iter()
        .find_map(|row| {
            let qid = row.entity_id(Var::Location)?;
            Some(Location {
                qid: Some(qid),
                name: row.get(Var::LocationLabel).map(str::to_string),
                lat: None,
                lon: None,
            })
        })
        .unwrap_or_default()
}

fn collect_part_of(rows: &[&BindingRow], own_id: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for row in rows {
        if let Some(qid) = row.entity_id(Var::PartOf) {
            if qid != own_id && !ids.contains(&qid) {
                ids.push(qid);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use timeline_common::Resolution;

    use super::*;

    fn entity(qid: &str) -> String {
        format!("http://www.wikidata.org/entity/{qid}")
    }

    fn row(qid: &str) -> BindingRow {
        BindingRow::new().with(Var::Item, entity(qid))
    }

    #[test]
    fn later_row_fills_missing_point_in_time() {
        let rows = vec![
            row("Q8676").with(Var::ItemLabel, "Battle of Midway"),
            row("Q8676")
                .with(Var::PointInTime, "1942-06-04T00:00:00Z")
                .with(Var::PointInTimePrecision, "11"),
        ];

        let events = group_rows(&rows);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].point_in_time,
            Some(DateField::new("1942-06-04T00:00:00Z", Resolution::Day))
        );
        assert_eq!(events[0].label, "Battle of Midway");
    }

    #[test]
    fn direct_value_beats_qualifier_in_same_row() {
        let rows = vec![row("Q1")
            .with(Var::StartTimeQualifier, "1939-01-01T00:00:00Z")
            .with(Var::StartTime, "1939-09-01T00:00:00Z")
            .with(Var::StartTimePrecision, "11")];

        let events = group_rows(&rows);
        assert_eq!(events[0].start_time.as_ref().unwrap().value, "1939-09-01T00:00:00Z");
    }

    #[test]
    fn qualifier_dates_infer_resolution_from_shape() {
        let rows = vec![row("Q1").with(Var::EndTimeQualifier, "1945-01-01T00:00:00Z")];

        let events = group_rows(&rows);
        assert_eq!(events[0].end_time, Some(DateField::new("1945", Resolution::Year)));
    }

    #[test]
    fn alternate_properties_fill_start_and_end() {
        let rows = vec![row("Q2")
            .with(Var::LaunchTime, "1969-07-16T13:32:00Z")
            .with(Var::LaunchTimePrecision, "13")
            .with(Var::LandingTime, "1969-07-24T16:50:35Z")
            .with(Var::LandingTimePrecision, "14")];

        let event = &group_rows(&rows)[0];
        assert_eq!(event.start_time.as_ref().unwrap().resolution, Resolution::Minute);
        assert_eq!(event.point_in_time.as_ref().unwrap().value, "1969-07-16T13:32:00Z");
        assert_eq!(event.end_time.as_ref().unwrap().resolution, Resolution::Second);
        assert_eq!(event.sort_key, "1969-07-16T13:32:00Z");
    }

    #[test]
    fn groups_preserve_first_appearance_order() {
        let rows = vec![row("Q3"), row("Q1"), row("Q3"), BindingRow::new(), row("Q2")];
        let ids: Vec<String> = group_rows(&rows).into_iter().map(|e| e.external_id).collect();
        assert_eq!(ids, vec!["Q3", "Q1", "Q2"]);
    }

    #[test]
    fn location_part_of_and_first_row_fields() {
        let rows = vec![
            row("Q5")
                .with(Var::Sitelinks, "42")
                .with(Var::Article, "https://en.wikipedia.org/wiki/Siege_of_Leningrad")
                .with(Var::PartOf, entity("Q1053446")),
            row("Q5").with(Var::PartOf, entity("Q5")),
            row("Q5")
                .with(Var::Location, entity("Q656"))
                .with(Var::LocationLabel, "Saint Petersburg")
                .with(Var::PartOf, entity("Q362"))
                .with(Var::Sitelinks, "7"),
            row("Q5")
                .with(Var::Location, entity("Q1"))
                .with(Var::PartOf, entity("Q1053446")),
        ];

        let event = &group_rows(&rows)[0];
        assert_eq!(event.location.qid.as_deref(), Some("Q656"));
        assert_eq!(event.location.name.as_deref(), Some("Saint Petersburg"));
        assert_eq!(event.part_of_ids, vec!["Q1053446".to_string(), "Q362".to_string()]);
        assert_eq!(event.sitelink_count, 42);
        assert_eq!(event.article_title.as_deref(), Some("Siege_of_Leningrad"));
    }

    #[test]
    fn dateless_entity_has_empty_sort_key() {
        let event = &group_rows(&[row("Q9").with(Var::ItemLabel, "Undated")])[0];
        assert!(event.point_in_time.is_none());
        assert_eq!(event.sort_key, "");
    }
}
