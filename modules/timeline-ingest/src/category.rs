//! Category resolution from "part of" relations, and the re-categorization pass.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::error::Result;
use crate::store::{EventFilter, EventStore};
use crate::traits::KnowledgeGraph;

/// First parent id (other than the entity itself) that names a known category.
pub fn resolve_category(
    part_of_ids: &[String],
    known: &HashSet<String>,
    own_id: &str,
) -> Option<String> {
    part_of_ids
        .iter()
        .find(|id| id.as_str() != own_id && known.contains(id.as_str()))
        .cloned()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecategorizeOutcome {
    /// Events whose category changed (or would change, in a dry run).
    pub updated: u64,
    pub already_correct: u64,
    /// Events with no known category among their parents.
    pub no_match: Vec<String>,
}

/// Re-resolve categories for the selected events from live "part of" data.
/// A dry run computes the outcome without writing.
pub async fn recategorize(
    graph: &dyn KnowledgeGraph,
    store: &dyn EventStore,
    filter: &EventFilter,
    dry_run: bool,
) -> Result<RecategorizeOutcome> {
    let events = store.list_events(filter).await?;
    if events.is_empty() {
        info!("No events selected for re-categorization");
        return Ok(RecategorizeOutcome::default());
    }

    let known: HashSet<String> = store
        .categories()
        .await?
        .into_iter()
        .map(|c| c.external_id)
        .collect();
    if known.is_empty() {
        info!("No categories stored, nothing to resolve against");
        return Ok(RecategorizeOutcome::default());
    }

    let ids: Vec<String> = events.iter().map(|e| e.record.external_id.clone()).collect();
    let parents: HashMap<String, Vec<String>> = graph.part_of(&ids).await?;

    let mut outcome = RecategorizeOutcome::default();
    let mut assignments = Vec::new();
    for event in &events {
        let own_id = &event.record.external_id;
        let parent_ids = parents.get(own_id).map(Vec::as_slice).unwrap_or_default();
        match resolve_category(parent_ids, &known, own_id) {
            Some(category) if event.category_id.as_deref() == Some(category.as_str()) => {
                outcome.already_correct += 1;
            }
            Some(category) => assignments.push((own_id.clone(), category)),
            None => outcome.no_match.push(own_id.clone()),
        }
    }

    outcome.updated = assignments.len() as u64;
    if !dry_run && !assignments.is_empty() {
        store.assign_categories(&assignments).await?;
    }

    info!(
        selected = events.len(),
        updated = outcome.updated,
        already_correct = outcome.already_correct,
        no_match = outcome.no_match.len(),
        dry_run,
        "Re-categorization complete"
    );
    Ok(outcome)
}

/// Link every selected event to one category.
pub async fn assign_all(
    store: &dyn EventStore,
    filter: &EventFilter,
    category_id: &str,
) -> Result<u64> {
    let changed = store.assign_category_to_all(filter, category_id).await?;
    info!(category_id, changed, "Assigned category to selected events");
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn known(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn first_known_parent_wins() {
        let parents = ids(&["Q1", "Q362", "Q361"]);
        assert_eq!(
            resolve_category(&parents, &known(&["Q361", "Q362"]), "Q9"),
            Some("Q362".to_string())
        );
    }

    #[test]
    fn own_id_is_never_its_category() {
        let parents = ids(&["Q9", "Q362"]);
        assert_eq!(
            resolve_category(&parents, &known(&["Q9", "Q362"]), "Q9"),
            Some("Q362".to_string())
        );
        assert_eq!(resolve_category(&ids(&["Q9"]), &known(&["Q9"]), "Q9"), None);
    }

    #[test]
    fn no_match_without_known_parent() {
        assert_eq!(resolve_category(&ids(&["Q1"]), &known(&["Q2"]), "Q9"), None);
        assert_eq!(resolve_category(&[], &known(&["Q2"]), "Q9"), None);
    }
}
