//! Session view projection for queries and UI refresh.
//!
//! The view is derived from [`SessionEvent`] only, never mutated directly.
//! `version` mirrors the last committed event sequence and is the value the
//! optimistic-concurrency check compares submitted expected versions
//! against. `live_elapsed` is always derived on demand from the accumulated
//! durations plus a clock read, so no background tick is needed anywhere.

use crate::domain::cqrs::{SessionAggregate, SessionEvent};
use crate::domain::types::{
    ActivityKind, CompletedSession, DeviceId, SessionStatus, Side, TimestampUtc,
};
use cqrs_es::{DomainEvent, EventEnvelope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One accepted, persisted command as seen in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub kind: String,
    pub at: TimestampUtc,
    pub device_id: DeviceId,
}

/// Read-only view of one session key derived from its event log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    key: Option<String>,
    kind: Option<ActivityKind>,
    status: SessionStatus,
    active_side: Option<Side>,
    accumulated: BTreeMap<Side, u64>,
    segment_started_at: Option<TimestampUtc>,
    started_at: Option<TimestampUtc>,
    paused_since: Option<TimestampUtc>,
    /// Derived statistic only; per-side accumulated time is authoritative.
    paused_secs: u64,
    last_persisted_at: Option<TimestampUtc>,
    version: u64,
    /// Accepted commands since session start, oldest first.
    command_log: Vec<CommandRecord>,
    completed: Option<CompletedSession>,
}

impl SessionView {
    /// Applies a committed event. Events arrive in sequence order; every one
    /// was fsynced before it reaches the view.
    pub fn apply_event(&mut self, aggregate_id: &str, event: &SessionEvent, sequence: u64) {
        self.key = Some(aggregate_id.to_string());
        self.version = sequence;

        match event {
            SessionEvent::SessionStarted {
                kind,
                active_side,
                occurred_at,
                ..
            } => {
                // A fresh session retires the previous record and its log.
                self.kind = Some(*kind);
                self.status = SessionStatus::Running;
                self.active_side = Some(*active_side);
                self.accumulated = BTreeMap::new();
                self.segment_started_at = Some(*occurred_at);
                self.started_at = Some(*occurred_at);
                self.paused_since = None;
                self.paused_secs = 0;
                self.command_log.clear();
                self.completed = None;
            }

            SessionEvent::SessionPaused { occurred_at, .. } => {
                self.fold_open_segment(occurred_at);
                self.status = SessionStatus::Paused;
                self.paused_since = Some(*occurred_at);
            }

            SessionEvent::SessionResumed { occurred_at, .. } => {
                if let Some(since) = self.paused_since.take() {
                    self.paused_secs += occurred_at.saturating_secs_since(&since);
                }
                self.segment_started_at = Some(*occurred_at);
                self.status = SessionStatus::Running;
            }

            SessionEvent::SideSwitched {
                side, occurred_at, ..
            } => {
                self.fold_open_segment(occurred_at);
                self.active_side = Some(*side);
                self.segment_started_at = Some(*occurred_at);
                self.status = SessionStatus::Running;
            }

            SessionEvent::SessionCompleted {
                occurred_at,
                auto_closed,
                note,
                ..
            } => {
                self.fold_open_segment(occurred_at);
                if let Some(since) = self.paused_since.take() {
                    self.paused_secs += occurred_at.saturating_secs_since(&since);
                }
                self.status = SessionStatus::Completed;
                if let (Some(kind), Some(started_at)) = (self.kind, self.started_at) {
                    self.completed = Some(CompletedSession {
                        kind,
                        accumulated: self.accumulated.clone(),
                        total_secs: self.accumulated.values().sum(),
                        started_at,
                        stopped_at: *occurred_at,
                        auto_closed: *auto_closed,
                        note: note.clone(),
                    });
                }
            }
        }

        self.last_persisted_at = Some(*event.occurred_at());
        self.command_log.push(CommandRecord {
            kind: event.event_type(),
            at: *event.occurred_at(),
            device_id: event.device_id().clone(),
        });
    }

    fn fold_open_segment(&mut self, at: &TimestampUtc) {
        if let Some(started) = self.segment_started_at.take() {
            let side = self.active_side.unwrap_or(Side::None);
            *self.accumulated.entry(side).or_insert(0) += at.saturating_secs_since(&started);
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn paused_since(&self) -> Option<&TimestampUtc> {
        self.paused_since.as_ref()
    }

    pub fn completed(&self) -> Option<&CompletedSession> {
        self.completed.as_ref()
    }

    pub fn command_log(&self) -> &[CommandRecord] {
        &self.command_log
    }

    /// Point-in-time snapshot with the derived live elapsed figure.
    pub fn snapshot(&self, now: &TimestampUtc) -> SessionSnapshot {
        let mut live_elapsed_secs: u64 = self.accumulated.values().sum();
        if self.status == SessionStatus::Running {
            if let Some(started) = &self.segment_started_at {
                live_elapsed_secs += now.saturating_secs_since(started);
            }
        }

        SessionSnapshot {
            key: self.key.clone(),
            kind: self.kind,
            status: self.status,
            active_side: self.active_side,
            accumulated: self.accumulated.clone(),
            live_elapsed_secs,
            paused_secs: self.paused_secs,
            segment_started_at: self.segment_started_at,
            started_at: self.started_at,
            last_persisted_at: self.last_persisted_at,
            version: self.version,
            command_log: self.command_log.clone(),
            completed: self.completed.clone(),
        }
    }
}

/// What a querier sees: the durable state plus `live_elapsed_secs` computed
/// against the clock at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub key: Option<String>,
    pub kind: Option<ActivityKind>,
    pub status: SessionStatus,
    pub active_side: Option<Side>,
    pub accumulated: BTreeMap<Side, u64>,
    pub live_elapsed_secs: u64,
    pub paused_secs: u64,
    pub segment_started_at: Option<TimestampUtc>,
    pub started_at: Option<TimestampUtc>,
    pub last_persisted_at: Option<TimestampUtc>,
    pub version: u64,
    pub command_log: Vec<CommandRecord>,
    pub completed: Option<CompletedSession>,
}

/// Event plus its position in the log, broadcast to local subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEventEnvelope {
    pub aggregate_id: String,
    pub sequence: u64,
    pub event: SessionEvent,
}

impl From<&EventEnvelope<SessionAggregate>> for SessionEventEnvelope {
    fn from(envelope: &EventEnvelope<SessionAggregate>) -> Self {
        Self {
            aggregate_id: envelope.aggregate_id.clone(),
            sequence: envelope.sequence as u64,
            event: envelope.payload.clone(),
        }
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
