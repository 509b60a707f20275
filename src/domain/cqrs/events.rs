//! Session events for the CQRS aggregate.
//!
//! Events are the facts the live timer is rebuilt from. Each carries the
//! instant it happened (taken from the injected clock at command time) and
//! the originating device, so replay is deterministic and ties between
//! devices are resolvable from the log alone.

use crate::domain::types::{ActivityKind, DeviceId, Side, TimestampUtc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};

/// Events emitted by the session aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session opened with its first running segment.
    SessionStarted {
        kind: ActivityKind,
        active_side: Side,
        device_id: DeviceId,
        occurred_at: TimestampUtc,
    },

    /// The open segment folded into the active side; timing stopped.
    SessionPaused {
        device_id: DeviceId,
        occurred_at: TimestampUtc,
    },

    /// A new segment opened after a pause.
    SessionResumed {
        device_id: DeviceId,
        occurred_at: TimestampUtc,
    },

    /// The open segment folded and a new one opened on another side.
    SideSwitched {
        side: Side,
        device_id: DeviceId,
        occurred_at: TimestampUtc,
    },

    /// The session finished; any open segment folded, durations frozen.
    SessionCompleted {
        device_id: DeviceId,
        occurred_at: TimestampUtc,
        auto_closed: bool,
        note: Option<String>,
    },
}

impl SessionEvent {
    /// The instant this event happened, per the clock that accepted it.
    pub fn occurred_at(&self) -> &TimestampUtc {
        match self {
            Self::SessionStarted { occurred_at, .. }
            | Self::SessionPaused { occurred_at, .. }
            | Self::SessionResumed { occurred_at, .. }
            | Self::SideSwitched { occurred_at, .. }
            | Self::SessionCompleted { occurred_at, .. } => occurred_at,
        }
    }

    /// The device the accepted command came from.
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::SessionStarted { device_id, .. }
            | Self::SessionPaused { device_id, .. }
            | Self::SessionResumed { device_id, .. }
            | Self::SideSwitched { device_id, .. }
            | Self::SessionCompleted { device_id, .. } => device_id,
        }
    }

    /// True for events that close a timed segment. These are the boundaries
    /// a crash must never lose, so they always force a durable snapshot.
    pub fn is_segment_boundary(&self) -> bool {
        matches!(
            self,
            Self::SessionPaused { .. } | Self::SideSwitched { .. } | Self::SessionCompleted { .. }
        )
    }
}

impl DomainEvent for SessionEvent {
    fn event_type(&self) -> String {
        match self {
            Self::SessionStarted { .. } => "SessionStarted".to_string(),
            Self::SessionPaused { .. } => "SessionPaused".to_string(),
            Self::SessionResumed { .. } => "SessionResumed".to_string(),
            Self::SideSwitched { .. } => "SideSwitched".to_string(),
            Self::SessionCompleted { .. } => "SessionCompleted".to_string(),
        }
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}
