//! CQRS query handler for session event projection.
//!
//! Applies committed events to the shared [`SessionView`] and fans them out
//! to subscribers via tokio channels.

use super::SessionAggregate;
use crate::domain::view::{SessionEventEnvelope, SessionView};
use async_trait::async_trait;
use cqrs_es::Query;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};

/// Query handler that maintains the session view projection.
pub struct SessionQuery {
    /// In-memory projection of the session state.
    pub projection: Arc<RwLock<SessionView>>,
    /// Watch channel for view snapshots (latest wins).
    pub snapshot_tx: watch::Sender<SessionView>,
    /// Broadcast channel for event streaming.
    pub event_tx: broadcast::Sender<SessionEventEnvelope>,
}

impl SessionQuery {
    pub fn new(
        projection: Arc<RwLock<SessionView>>,
        snapshot_tx: watch::Sender<SessionView>,
        event_tx: broadcast::Sender<SessionEventEnvelope>,
    ) -> Self {
        Self {
            projection,
            snapshot_tx,
            event_tx,
        }
    }
}

#[async_trait]
impl Query<SessionAggregate> for SessionQuery {
    async fn dispatch(
        &self,
        aggregate_id: &str,
        events: &[cqrs_es::EventEnvelope<SessionAggregate>],
    ) {
        let mut view = self.projection.write().await;

        for event in events {
            view.apply_event(aggregate_id, &event.payload, event.sequence as u64);

            let envelope = SessionEventEnvelope::from(event);
            if self.event_tx.send(envelope).is_err() {
                tracing::debug!("no live subscribers for session event stream");
            }
        }

        let _ = self.snapshot_tx.send(view.clone());
    }
}
