//! Durable persistence for session event logs and snapshots.

mod file_store;

pub use file_store::{FileAggregateContext, FileEventStore, StoredEvent, StoredSnapshot};
