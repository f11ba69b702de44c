pub mod config;
pub mod dates;
pub mod importance;
pub mod types;

pub use config::Config;
pub use dates::{normalize_date, record_sort_key, sortable_key};
pub use importance::{ImportanceScorer, ScoringConfig};
pub use types::*;
