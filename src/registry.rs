//! Keyed registry of live session engines.
//!
//! One actor per (baby, activity-kind) key; sessions for different keys
//! proceed fully independently. Actors are spawned on first command and
//! respawned from the durable log if they die, which is all crash recovery
//! is. Queries read the log directly when no actor is live, so looking at a
//! key never spawns one.

use crate::config::EngineConfig;
use crate::domain::actor::{
    bootstrap_view_from_events, create_actor_args, session_log_path, SessionActor, SessionMessage,
};
use crate::domain::cqrs::SessionCommand;
use crate::domain::errors::SessionError;
use crate::domain::services::SessionServices;
use crate::domain::types::SessionKey;
use crate::domain::view::SessionView;
use ractor::{Actor, ActorRef, ActorStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};

struct SessionHandle {
    actor: ActorRef<SessionMessage>,
    view_rx: watch::Receiver<SessionView>,
}

impl SessionHandle {
    fn is_live(&self) -> bool {
        matches!(
            self.actor.get_status(),
            ActorStatus::Starting | ActorStatus::Running
        )
    }
}

/// Registry mapping session keys to their live actors.
pub struct SessionRegistry {
    data_dir: PathBuf,
    config: EngineConfig,
    services: SessionServices,
    sessions: Mutex<HashMap<SessionKey, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(data_dir: PathBuf, config: EngineConfig, services: SessionServices) -> Self {
        Self {
            data_dir,
            config,
            services,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submits a command for a key under the optimistic version check.
    ///
    /// The wait on the per-key serialization point is bounded; a session
    /// actor that cannot answer in time surfaces as `EngineBusy` instead of
    /// stalling the caller indefinitely.
    pub async fn submit(
        &self,
        key: &SessionKey,
        command: SessionCommand,
        expected_version: u64,
    ) -> Result<SessionView, SessionError> {
        let actor = self.ensure(key).await?;

        let (tx, rx) = oneshot::channel();
        actor
            .send_message(SessionMessage::Submit {
                command: Box::new(command),
                expected_version,
                reply: tx,
            })
            .map_err(|_| SessionError::EngineBusy)?;

        match tokio::time::timeout(self.submit_timeout(), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SessionError::EngineBusy),
            Err(_) => Err(SessionError::EngineBusy),
        }
    }

    /// Current consistent view for a key. A live actor answers from its
    /// latest broadcast snapshot, so queries never wait behind writers; a
    /// key without one is read straight from the durable log, so looking at
    /// a key never costs an actor.
    pub async fn current_view(&self, key: &SessionKey) -> Result<SessionView, SessionError> {
        let sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(key) {
            if handle.is_live() {
                let view = handle.view_rx.borrow().clone();
                return Ok(view);
            }
        }
        drop(sessions);

        let aggregate_id = key.aggregate_id();
        Ok(bootstrap_view_from_events(
            &session_log_path(&self.data_dir, &aggregate_id),
            &aggregate_id,
        ))
    }

    /// Drops any cached handle for the key and rebuilds the view from
    /// durable state: last snapshot plus every log entry after it.
    pub async fn recover(&self, key: &SessionKey) -> Result<SessionView, SessionError> {
        self.retire(key).await;
        self.current_view(key).await
    }

    /// Stops and removes the actor for a key (after completion, or to force
    /// a rebuild from disk).
    pub async fn retire(&self, key: &SessionKey) {
        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.remove(key) {
            handle.actor.stop(None);
        }
    }

    /// Keys with a live actor in this process.
    pub async fn live_keys(&self) -> Vec<SessionKey> {
        self.sessions.lock().await.keys().copied().collect()
    }

    async fn ensure(&self, key: &SessionKey) -> Result<ActorRef<SessionMessage>, SessionError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(handle) = sessions.get(key) {
            if handle.is_live() {
                return Ok(handle.actor.clone());
            }
            // The actor died under us. Drop the stale handle and rebuild
            // from the log so the key keeps working without a restart.
            tracing::warn!(key = %key, "session actor dead, respawning from log");
            sessions.remove(key);
        }

        let (args, view_rx, _event_rx) =
            create_actor_args(&self.data_dir, key, &self.config, self.services.clone());

        let (actor, _join) = SessionActor::spawn(None, SessionActor, args)
            .await
            .map_err(|e| SessionError::PersistenceFailure {
                message: format!("failed to spawn session actor: {}", e),
            })?;

        tracing::debug!(key = %key, "session actor spawned");
        sessions.insert(
            *key,
            SessionHandle {
                actor: actor.clone(),
                view_rx,
            },
        );

        Ok(actor)
    }

    fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.config.submit_timeout_ms)
    }

    #[cfg(test)]
    pub(crate) async fn kill_actor(&self, key: &SessionKey) {
        let sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(key) {
            handle.actor.kill();
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
