//! Coordinator: the engine's public surface.
//!
//! Wraps the registry with the role gate, the derived-elapsed query shape,
//! the idle reaper and the finished-session handoff. Hosts construct one
//! coordinator per data directory and call it from whatever transport they
//! expose; everything here is transport-agnostic.

use crate::config::EngineConfig;
use crate::domain::cqrs::SessionCommand;
use crate::domain::errors::SessionError;
use crate::domain::services::{SessionClock, SessionServices};
use crate::domain::types::{
    ActivityKind, BabyId, CompletedSession, DeviceId, Role, SessionKey, Side, TimestampUtc, UserId,
};
use crate::domain::view::{SessionSnapshot, SessionView};
use crate::registry::SessionRegistry;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Device id recorded on sessions the reaper closes.
const REAPER_DEVICE: &str = "reaper";

/// Caller identity as resolved by the host's access-control layer. The
/// engine trusts it; it does not authenticate.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Seam to the surrounding application's record store. A completed session
/// is handed over here exactly once, as an immutable record.
#[async_trait]
pub trait FinishedEventSink: Send + Sync {
    async fn record_finished(
        &self,
        baby_id: &BabyId,
        kind: ActivityKind,
        finished: &CompletedSession,
    ) -> anyhow::Result<()>;
}

/// Front door for session commands and queries.
pub struct SessionCoordinator {
    registry: SessionRegistry,
    sink: Arc<dyn FinishedEventSink>,
    clock: SessionClock,
    paused_ceiling: chrono::Duration,
}

impl SessionCoordinator {
    pub fn new(
        data_dir: PathBuf,
        config: EngineConfig,
        services: SessionServices,
        sink: Arc<dyn FinishedEventSink>,
    ) -> Self {
        let clock = services.clock.clone();
        let paused_ceiling = chrono::Duration::hours(config.paused_ceiling_hours);
        Self {
            registry: SessionRegistry::new(data_dir, config, services),
            sink,
            clock,
            paused_ceiling,
        }
    }

    /// Starts a session for the key, first auto-closing any paused session
    /// that outlived the ceiling so an abandoned session cannot block a new
    /// one. When such a reap happens the caller's expected version predates
    /// it by definition, so the start is submitted at the post-reap version.
    pub async fn start(
        &self,
        auth: &AuthContext,
        key: &SessionKey,
        device_id: DeviceId,
        expected_version: u64,
    ) -> Result<SessionSnapshot, SessionError> {
        self.require_caregiver(auth)?;

        let mut expected = expected_version;
        if self.reap_if_expired(key).await? {
            expected = self.registry.current_view(key).await?.version();
        }

        let view = self
            .registry
            .submit(
                key,
                SessionCommand::Start {
                    kind: key.kind,
                    device_id,
                },
                expected,
            )
            .await?;
        Ok(self.snapshot_of(&view))
    }

    pub async fn pause(
        &self,
        auth: &AuthContext,
        key: &SessionKey,
        device_id: DeviceId,
        expected_version: u64,
    ) -> Result<SessionSnapshot, SessionError> {
        self.require_caregiver(auth)?;
        let view = self
            .registry
            .submit(key, SessionCommand::Pause { device_id }, expected_version)
            .await?;
        Ok(self.snapshot_of(&view))
    }

    pub async fn resume(
        &self,
        auth: &AuthContext,
        key: &SessionKey,
        device_id: DeviceId,
        expected_version: u64,
    ) -> Result<SessionSnapshot, SessionError> {
        self.require_caregiver(auth)?;
        let view = self
            .registry
            .submit(key, SessionCommand::Resume { device_id }, expected_version)
            .await?;
        Ok(self.snapshot_of(&view))
    }

    pub async fn switch_side(
        &self,
        auth: &AuthContext,
        key: &SessionKey,
        side: Side,
        device_id: DeviceId,
        expected_version: u64,
    ) -> Result<SessionSnapshot, SessionError> {
        self.require_caregiver(auth)?;
        let view = self
            .registry
            .submit(
                key,
                SessionCommand::SwitchSide { side, device_id },
                expected_version,
            )
            .await?;
        Ok(self.snapshot_of(&view))
    }

    /// Stops the session, hands the finished record to the sink and retires
    /// the key's actor. The handoff happens once; a sink failure is logged
    /// and does not undo the completed session, since the durable log
    /// already holds the truth.
    pub async fn stop(
        &self,
        auth: &AuthContext,
        key: &SessionKey,
        device_id: DeviceId,
        note: Option<String>,
        expected_version: u64,
    ) -> Result<SessionSnapshot, SessionError> {
        self.require_caregiver(auth)?;
        let view = self
            .registry
            .submit(
                key,
                SessionCommand::Stop {
                    device_id,
                    auto_closed: false,
                    note,
                },
                expected_version,
            )
            .await?;

        self.hand_off(key, &view).await;
        self.registry.retire(key).await;
        Ok(self.snapshot_of(&view))
    }

    /// Liveness signal from a device. Accepted on any live session and never
    /// advances the version, so heartbeats from several devices cannot
    /// conflict with each other.
    pub async fn heartbeat(
        &self,
        auth: &AuthContext,
        key: &SessionKey,
        device_id: DeviceId,
        expected_version: u64,
    ) -> Result<SessionSnapshot, SessionError> {
        self.require_caregiver(auth)?;
        let view = self
            .registry
            .submit(
                key,
                SessionCommand::Heartbeat { device_id },
                expected_version,
            )
            .await?;
        Ok(self.snapshot_of(&view))
    }

    /// Current state of the key with `live_elapsed_secs` computed at call
    /// time. Open to both roles and never blocked by in-flight commands.
    pub async fn query(
        &self,
        _auth: &AuthContext,
        key: &SessionKey,
    ) -> Result<SessionSnapshot, SessionError> {
        let view = self.registry.current_view(key).await?;
        Ok(self.snapshot_of(&view))
    }

    /// Sweeps every live key and auto-closes paused sessions older than the
    /// ceiling. Returns the keys that were reaped. Hosts call this on a
    /// timer; `start` also reaps its own key lazily.
    pub async fn reap_expired(&self) -> Vec<SessionKey> {
        let mut reaped = Vec::new();
        for key in self.registry.live_keys().await {
            match self.reap_if_expired(&key).await {
                Ok(true) => reaped.push(key),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "reap sweep skipped key");
                }
            }
        }
        reaped
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    async fn reap_if_expired(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let view = self.registry.current_view(key).await?;
        let Some(paused_since) = view.paused_since().copied() else {
            return Ok(false);
        };

        let deadline = TimestampUtc(paused_since.0 + self.paused_ceiling);
        if self.clock.now() < deadline {
            return Ok(false);
        }

        tracing::info!(key = %key, paused_since = %paused_since, "auto-closing expired paused session");
        let stopped = self
            .registry
            .submit(
                key,
                SessionCommand::Stop {
                    device_id: DeviceId::from(REAPER_DEVICE),
                    auto_closed: true,
                    note: Some("auto-closed: paused past the idle ceiling".to_string()),
                },
                view.version(),
            )
            .await?;

        self.hand_off(key, &stopped).await;
        self.registry.retire(key).await;
        Ok(true)
    }

    async fn hand_off(&self, key: &SessionKey, view: &SessionView) {
        if let Some(finished) = view.completed() {
            if let Err(err) = self
                .sink
                .record_finished(&key.baby_id, key.kind, finished)
                .await
            {
                tracing::error!(key = %key, error = %err, "finished-session handoff failed");
            }
        }
    }

    fn snapshot_of(&self, view: &SessionView) -> SessionSnapshot {
        view.snapshot(&self.clock.now())
    }

    fn require_caregiver(&self, auth: &AuthContext) -> Result<(), SessionError> {
        match auth.role {
            Role::Caregiver => Ok(()),
            Role::Viewer => {
                tracing::warn!(user_id = %auth.user_id, "viewer attempted a mutating command");
                Err(SessionError::Forbidden)
            }
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
