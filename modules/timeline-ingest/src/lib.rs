pub mod catalog;
pub mod category;
pub mod enrichment;
pub mod error;
pub mod grouping;
pub mod loader;
pub mod maintenance;
pub mod progress;
pub mod store;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use catalog::{load_catalog, CatalogOutcome, CatalogPlan};
pub use category::{assign_all, recategorize, resolve_category, RecategorizeOutcome};
pub use error::{IngestError, Result};
pub use grouping::group_rows;
pub use loader::{EventLoader, LoadOptions, LoadOutcome, DEFAULT_CATEGORY_LIMIT, DEFAULT_TYPE_LIMIT};
pub use maintenance::{backfill_extracts, refresh_scores, BackfillOutcome};
pub use progress::{IngestEvent, ProgressReporter, SilentReporter, TracingReporter};
pub use store::{
    EventFilter, EventOrder, EventStore, EventUpsert, PgEventStore, StoredEvent, UpsertCounts,
};
pub use traits::{EngagementSource, KnowledgeGraph};
