use serde::{Deserialize, Serialize};
use timeline_common::EntityRef;

/// A curated historical event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventType {
    pub qid: &'static str,
    pub label: &'static str,
}

/// Default type list for type discovery.
pub const HISTORICAL_EVENT_TYPES: &[EventType] = &[
    EventType { qid: "Q198", label: "war" },
    EventType { qid: "Q178561", label: "battle" },
    EventType { qid: "Q131569", label: "treaty" },
    EventType { qid: "Q8690", label: "revolution" },
    EventType { qid: "Q188055", label: "siege" },
    EventType { qid: "Q891854", label: "military campaign" },
    EventType { qid: "Q12184", label: "pandemic" },
    EventType { qid: "Q3839081", label: "disaster" },
    EventType { qid: "Q35127", label: "genocide" },
    EventType { qid: "Q3024240", label: "historical event" },
    EventType { qid: "Q2401485", label: "expedition" },
    EventType { qid: "Q1361567", label: "coronation" },
    EventType { qid: "Q3882219", label: "assassination" },
    EventType { qid: "Q2133344", label: "space mission" },
    EventType { qid: "Q45382", label: "coup d'état" },
    EventType { qid: "Q1464916", label: "declaration of independence" },
    EventType { qid: "Q40231", label: "election" },
    EventType { qid: "Q168247", label: "famine" },
    EventType { qid: "Q5389", label: "Olympic Games" },
    EventType { qid: "Q124734", label: "rebellion" },
    EventType { qid: "Q3199915", label: "massacre" },
    EventType { qid: "Q184211", label: "referendum" },
    EventType { qid: "Q273120", label: "protest" },
    EventType { qid: "Q124757", label: "riot" },
];

pub const DEFAULT_MIN_SITELINKS: u32 = 2;

pub fn default_type_qids() -> Vec<String> {
    HISTORICAL_EVENT_TYPES.iter().map(|t| t.qid.to_string()).collect()
}

/// Resolve a type given as an id (`Q178561`) or a curated label (`battle`).
/// Ids outside the curated list resolve to themselves as label.
pub fn resolve_event_type(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if timeline_common::is_entity_id(value) {
        let label = HISTORICAL_EVENT_TYPES
            .iter()
            .find(|t| t.qid == value)
            .map_or(value, |t| t.label);
        return Some((value.to_string(), label.to_string()));
    }
    let lower = value.to_lowercase();
    HISTORICAL_EVENT_TYPES
        .iter()
        .find(|t| t.label.to_lowercase() == lower)
        .map(|t| (t.qid.to_string(), t.label.to_string()))
}

/// Label and classification of a category entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProperties {
    pub label: String,
    pub instance_of: Vec<EntityRef>,
    pub subclass_of: Vec<EntityRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodItem {
    pub qid: String,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_id_or_label() {
        assert_eq!(
            resolve_event_type("Q178561"),
            Some(("Q178561".into(), "battle".into()))
        );
        assert_eq!(
            resolve_event_type("Battle"),
            Some(("Q178561".into(), "battle".into()))
        );
        assert_eq!(
            resolve_event_type("olympic games"),
            Some(("Q5389".into(), "Olympic Games".into()))
        );
        assert_eq!(
            resolve_event_type("Q69502940"),
            Some(("Q69502940".into(), "Q69502940".into()))
        );
        assert_eq!(resolve_event_type("picnic"), None);
        assert_eq!(resolve_event_type("  "), None);
    }

    #[test]
    fn default_types_are_unique_ids() {
        let mut ids = default_type_qids();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(ids.iter().all(|id| timeline_common::is_entity_id(id)));
    }
}
