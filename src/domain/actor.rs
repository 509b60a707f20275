//! Session actor: the reconciliation point for one session key.
//!
//! All commands for a key funnel through this actor, which makes multi-device
//! editing tractable: commands are applied strictly one at a time, each
//! carrying the version its sender last observed. A stale version is turned
//! away with `VersionConflict` before anything touches the store, so two
//! devices racing to pause and switch sides can never interleave their
//! effects; the loser refetches and retries.

use crate::config::EngineConfig;
use crate::domain::cqrs::{SessionAggregate, SessionCommand, SessionQuery};
use crate::domain::errors::SessionError;
use crate::domain::services::SessionServices;
use crate::domain::types::SessionKey;
use crate::domain::view::{SessionEventEnvelope, SessionView};
use crate::event_store::{FileEventStore, StoredEvent};
use async_trait::async_trait;
use cqrs_es::{AggregateError, CqrsFramework};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch, RwLock};

/// Messages that can be sent to a session actor.
pub enum SessionMessage {
    /// Apply a command under an optimistic version check and return the
    /// updated view (or the rejection reason).
    Submit {
        command: Box<SessionCommand>,
        expected_version: u64,
        reply: oneshot::Sender<Result<SessionView, SessionError>>,
    },
    /// Get the current view. Never advances the version.
    GetView(oneshot::Sender<SessionView>),
}

/// Arguments for spawning a session actor.
#[derive(Clone)]
pub struct SessionActorArgs {
    /// Aggregate id, derived from the session key.
    pub aggregate_id: String,
    /// Path to the event log file.
    pub log_path: PathBuf,
    /// Path to the snapshot file.
    pub snapshot_path: PathBuf,
    /// Minimum interval between non-boundary snapshots.
    pub snapshot_min_interval: chrono::Duration,
    /// Shared view for projection.
    pub view: Arc<RwLock<SessionView>>,
    /// Watch channel sender for view snapshots.
    pub snapshot_tx: watch::Sender<SessionView>,
    /// Broadcast channel sender for event streaming.
    pub event_tx: broadcast::Sender<SessionEventEnvelope>,
    /// Services for command handling.
    pub services: SessionServices,
}

/// State maintained by a session actor.
pub struct SessionActorState {
    /// The CQRS framework instance.
    pub cqrs: CqrsFramework<SessionAggregate, FileEventStore>,
    /// The aggregate ID.
    pub aggregate_id: String,
    /// Shared view for reading.
    pub view: Arc<RwLock<SessionView>>,
}

/// The session actor.
pub struct SessionActor;

impl SessionActor {
    /// Builds the CQRS framework from actor arguments.
    pub fn build_cqrs(args: &SessionActorArgs) -> CqrsFramework<SessionAggregate, FileEventStore> {
        let store = FileEventStore::new(
            args.log_path.clone(),
            args.snapshot_path.clone(),
            args.snapshot_min_interval,
        );

        let query = SessionQuery::new(
            args.view.clone(),
            args.snapshot_tx.clone(),
            args.event_tx.clone(),
        );

        CqrsFramework::new(store, vec![Box::new(query)], args.services.clone())
    }
}

#[async_trait]
impl Actor for SessionActor {
    type Msg = SessionMessage;
    type State = SessionActorState;
    type Arguments = SessionActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let cqrs = SessionActor::build_cqrs(&args);

        Ok(SessionActorState {
            cqrs,
            aggregate_id: args.aggregate_id,
            view: args.view,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SessionMessage::Submit {
                command,
                expected_version,
                reply,
            } => {
                let current = state.view.read().await.version();

                let mapped = if current != expected_version {
                    Err(SessionError::VersionConflict {
                        expected: expected_version,
                        actual: current,
                    })
                } else {
                    let result = state.cqrs.execute(&state.aggregate_id, *command).await;
                    let view = state.view.read().await.clone();

                    match result {
                        Ok(()) => Ok(view),
                        Err(AggregateError::UserError(err)) => Err(err),
                        Err(AggregateError::AggregateConflict) => {
                            // Another process appended to this key's log.
                            Err(SessionError::VersionConflict {
                                expected: expected_version,
                                actual: view.version(),
                            })
                        }
                        Err(err) => Err(SessionError::PersistenceFailure {
                            message: err.to_string(),
                        }),
                    }
                };

                if reply.send(mapped).is_err() {
                    tracing::debug!("submit reply channel closed");
                }
            }
            SessionMessage::GetView(reply) => {
                let view = state.view.read().await.clone();
                if reply.send(view).is_err() {
                    tracing::debug!("view reply channel closed");
                }
            }
        }

        Ok(())
    }
}

/// Bootstraps a [`SessionView`] by replaying events from an event log file.
///
/// Used when (re)spawning an actor for a key that already has history, so
/// the view is crash-consistent up to the last fsynced log entry. Returns
/// `SessionView::default()` if the log file doesn't exist.
pub fn bootstrap_view_from_events(log_path: &Path, aggregate_id: &str) -> SessionView {
    let mut view = SessionView::default();

    let file = match File::open(log_path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return view,
        Err(_) => return view,
    };

    let reader = BufReader::new(file);
    let mut skipped_lines = 0;

    for line in reader.lines().map_while(Result::ok) {
        if let Ok(stored) = serde_json::from_str::<StoredEvent>(&line) {
            if stored.aggregate_id == aggregate_id {
                view.apply_event(&stored.aggregate_id, &stored.event, stored.sequence);
            }
        } else {
            skipped_lines += 1;
        }
    }

    if skipped_lines > 0 {
        tracing::warn!("skipped {} unparseable lines in event log", skipped_lines);
    }

    view
}

/// Event log path for an aggregate under the engine's data directory.
pub fn session_log_path(data_dir: &Path, aggregate_id: &str) -> PathBuf {
    data_dir.join(format!("{}.events.jsonl", aggregate_id))
}

/// Snapshot path for an aggregate under the engine's data directory.
pub fn session_snapshot_path(data_dir: &Path, aggregate_id: &str) -> PathBuf {
    data_dir.join(format!("{}.snapshot.json", aggregate_id))
}

/// Builds actor arguments for a session key, bootstrapping the initial view
/// from any events already on disk.
pub fn create_actor_args(
    data_dir: &Path,
    key: &SessionKey,
    config: &EngineConfig,
    services: SessionServices,
) -> (
    SessionActorArgs,
    watch::Receiver<SessionView>,
    broadcast::Receiver<SessionEventEnvelope>,
) {
    let aggregate_id = key.aggregate_id();
    let log_path = session_log_path(data_dir, &aggregate_id);
    let snapshot_path = session_snapshot_path(data_dir, &aggregate_id);

    let initial_view = bootstrap_view_from_events(&log_path, &aggregate_id);
    let view = Arc::new(RwLock::new(initial_view.clone()));
    let (snapshot_tx, snapshot_rx) = watch::channel(initial_view);
    let (event_tx, event_rx) = broadcast::channel(config.channel_capacity);

    let args = SessionActorArgs {
        aggregate_id,
        log_path,
        snapshot_path,
        snapshot_min_interval: chrono::Duration::seconds(config.snapshot_min_interval_secs),
        view,
        snapshot_tx,
        event_tx,
        services,
    };

    (args, snapshot_rx, event_rx)
}

#[cfg(test)]
#[path = "tests/actor_tests.rs"]
mod tests;
