//! CQRS core for the live session timer.
//!
//! This module is the Session State Machine: commands are validated against
//! the current status in [`Aggregate::handle`] and the accepted facts are
//! applied deterministically in [`Aggregate::apply`]. All duration
//! accounting folds from event timestamps, so replaying the log reproduces
//! the exact pre-crash state.

pub mod commands;
pub mod events;
pub mod query;

pub use commands::SessionCommand;
pub use events::SessionEvent;
pub use query::SessionQuery;

use crate::domain::errors::SessionError;
use crate::domain::services::SessionServices;
use crate::domain::types::{
    ActivityKind, CompletedSession, SessionStatus, Side, TimestampUtc,
};
use async_trait::async_trait;
use commands::command_name;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Live session data while the aggregate is running or paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    kind: ActivityKind,
    active_side: Side,
    /// Per-side accumulated seconds. Only grows, and only when a running
    /// segment folds.
    accumulated: BTreeMap<Side, u64>,
    /// Start of the current running segment; present iff running.
    segment_started_at: Option<TimestampUtc>,
    started_at: TimestampUtc,
}

impl SessionData {
    fn open(kind: ActivityKind, active_side: Side, at: TimestampUtc) -> Self {
        Self {
            kind,
            active_side,
            accumulated: BTreeMap::new(),
            segment_started_at: Some(at),
            started_at: at,
        }
    }

    fn is_running(&self) -> bool {
        self.segment_started_at.is_some()
    }

    /// Folds the open segment (if any) into the active side and closes it.
    fn fold_open_segment(&mut self, at: &TimestampUtc) {
        if let Some(started) = self.segment_started_at.take() {
            let secs = at.saturating_secs_since(&started);
            *self.accumulated.entry(self.active_side).or_insert(0) += secs;
        }
    }
}

/// Session aggregate state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum SessionState {
    /// No session has ever run under this key.
    #[default]
    Idle,
    /// A session is running or paused.
    Live(Box<SessionData>),
    /// The last session under this key finished; its record is immutable
    /// and a new `Start` opens a fresh session.
    Completed(Box<CompletedSession>),
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Idle => SessionStatus::Idle,
            Self::Live(data) if data.is_running() => SessionStatus::Running,
            Self::Live(_) => SessionStatus::Paused,
            Self::Completed(_) => SessionStatus::Completed,
        }
    }
}

/// The session aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionAggregate {
    pub state: SessionState,
}

#[async_trait]
impl Aggregate for SessionAggregate {
    type Command = SessionCommand;
    type Event = SessionEvent;
    type Error = SessionError;
    type Services = SessionServices;

    fn aggregate_type() -> String {
        "timed_session".to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        let now = services.clock.now();

        match (&self.state, command) {
            // Start opens a session from idle, or after the previous one
            // under this key was retired.
            (SessionState::Idle, SessionCommand::Start { kind, device_id })
            | (SessionState::Completed(_), SessionCommand::Start { kind, device_id }) => {
                Ok(vec![SessionEvent::SessionStarted {
                    kind,
                    active_side: kind.default_side(),
                    device_id,
                    occurred_at: now,
                }])
            }

            // Never silently overwrite a live session.
            (SessionState::Live(_), SessionCommand::Start { .. }) => {
                Err(SessionError::SessionAlreadyActive)
            }

            (SessionState::Live(data), SessionCommand::Pause { device_id })
                if data.is_running() =>
            {
                Ok(vec![SessionEvent::SessionPaused {
                    device_id,
                    occurred_at: now,
                }])
            }

            (SessionState::Live(data), SessionCommand::Resume { device_id })
                if !data.is_running() =>
            {
                Ok(vec![SessionEvent::SessionResumed {
                    device_id,
                    occurred_at: now,
                }])
            }

            (SessionState::Live(data), SessionCommand::SwitchSide { side, device_id })
                if data.is_running() =>
            {
                if data.kind != ActivityKind::Nursing {
                    return Err(SessionError::InvalidTransition {
                        message: "side switching only applies to nursing sessions".to_string(),
                    });
                }
                if side == data.active_side {
                    // Duplicate client send; accepted without effect.
                    return Ok(vec![]);
                }
                Ok(vec![SessionEvent::SideSwitched {
                    side,
                    device_id,
                    occurred_at: now,
                }])
            }

            // Stop is valid while running or paused.
            (
                SessionState::Live(_),
                SessionCommand::Stop {
                    device_id,
                    auto_closed,
                    note,
                },
            ) => Ok(vec![SessionEvent::SessionCompleted {
                device_id,
                occurred_at: now,
                auto_closed,
                note,
            }]),

            // Liveness probe; accepted on any live session, no fact emitted.
            (SessionState::Live(_), SessionCommand::Heartbeat { .. }) => Ok(vec![]),

            // Everything else is off the transition table.
            (state, cmd) => Err(SessionError::InvalidTransition {
                message: format!(
                    "command '{}' not valid while session is {}",
                    command_name(&cmd),
                    state.status()
                ),
            }),
        }
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SessionEvent::SessionStarted {
                kind,
                active_side,
                occurred_at,
                ..
            } => {
                self.state =
                    SessionState::Live(Box::new(SessionData::open(kind, active_side, occurred_at)));
            }

            SessionEvent::SessionPaused { occurred_at, .. } => {
                if let SessionState::Live(data) = &mut self.state {
                    data.fold_open_segment(&occurred_at);
                }
            }

            SessionEvent::SessionResumed { occurred_at, .. } => {
                if let SessionState::Live(data) = &mut self.state {
                    data.segment_started_at = Some(occurred_at);
                }
            }

            SessionEvent::SideSwitched {
                side, occurred_at, ..
            } => {
                if let SessionState::Live(data) = &mut self.state {
                    data.fold_open_segment(&occurred_at);
                    data.active_side = side;
                    data.segment_started_at = Some(occurred_at);
                }
            }

            SessionEvent::SessionCompleted {
                occurred_at,
                auto_closed,
                note,
                ..
            } => {
                let finished = if let SessionState::Live(data) = &mut self.state {
                    data.fold_open_segment(&occurred_at);
                    let total_secs = data.accumulated.values().sum();
                    Some(CompletedSession {
                        kind: data.kind,
                        accumulated: std::mem::take(&mut data.accumulated),
                        total_secs,
                        started_at: data.started_at,
                        stopped_at: occurred_at,
                        auto_closed,
                        note,
                    })
                } else {
                    None
                };
                if let Some(finished) = finished {
                    self.state = SessionState::Completed(Box::new(finished));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/aggregate_tests.rs"]
mod tests;

#[cfg(test)]
#[path = "../tests/accounting_props.rs"]
mod props;
