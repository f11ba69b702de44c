pub mod bindings;
pub mod error;
pub mod query;
pub mod retry;
pub mod sparql;
pub mod types;
pub mod wikimedia;

pub use bindings::{article_title_from_url, extract_entity_id, parse_results, BindingRow, Var};
pub use error::{ErrorClass, Result, WikidataError};
pub use query::{CategoryQuery, TypeDiscoveryQuery, YearRange, BATCH_SIZE};
pub use retry::{RetryEvent, RetryExecutor, RetryObserver, RetryPolicy};
pub use sparql::WikidataClient;
pub use types::{
    default_type_qids, resolve_event_type, CategoryProperties, EventType, PeriodItem,
    DEFAULT_MIN_SITELINKS, HISTORICAL_EVENT_TYPES,
};
pub use wikimedia::{Engagement, WikimediaClient, BACKLINKS_LIMIT};
