//! Session commands for the CQRS aggregate.
//!
//! Commands represent intent from one device. The aggregate validates them
//! against the current status and produces events that are persisted to the
//! per-key log.

use crate::domain::types::{ActivityKind, DeviceId, Side};
use serde::{Deserialize, Serialize};

/// Commands that can be executed against a session aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCommand {
    /// Open a new session. Rejected while one is already running or paused.
    Start {
        kind: ActivityKind,
        device_id: DeviceId,
    },

    /// Pause the running session, folding the open segment.
    Pause { device_id: DeviceId },

    /// Resume a paused session, opening a new segment.
    Resume { device_id: DeviceId },

    /// Move the running nursing session to another side. Switching to the
    /// side already active is an accepted no-op so duplicate client sends
    /// are tolerated.
    SwitchSide { side: Side, device_id: DeviceId },

    /// Finish the session and freeze the final durations.
    Stop {
        device_id: DeviceId,
        auto_closed: bool,
        note: Option<String>,
    },

    /// Liveness probe. Accepted on any live session, changes nothing and
    /// never advances the version.
    Heartbeat { device_id: DeviceId },
}

/// Extracts a human-readable name from a command for error messages.
pub(crate) fn command_name(cmd: &SessionCommand) -> &'static str {
    match cmd {
        SessionCommand::Start { .. } => "Start",
        SessionCommand::Pause { .. } => "Pause",
        SessionCommand::Resume { .. } => "Resume",
        SessionCommand::SwitchSide { .. } => "SwitchSide",
        SessionCommand::Stop { .. } => "Stop",
        SessionCommand::Heartbeat { .. } => "Heartbeat",
    }
}
