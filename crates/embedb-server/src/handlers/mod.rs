//! HTTP handlers, organized by domain:
//! - `health`: liveness probe
//! - `documents`: document/vector writes and reads
//! - `search`: similarity queries
//! - `admin`: rebuild, snapshot, stats

pub mod admin;
pub mod documents;
pub mod health;
pub mod helpers;
pub mod search;

pub use admin::{create_snapshot, rebuild_index, stats};
pub use documents::{delete_document, get_document, index_document, upsert_vector};
pub use health::health_check;
pub use search::search;
