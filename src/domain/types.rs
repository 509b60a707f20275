//! Strongly typed domain primitives for timed sessions.
//!
//! These newtypes give identifiers and timestamps semantic weight and keep
//! the command/event surfaces honest about what they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for a baby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BabyId(pub Uuid);

impl BabyId {
    /// Creates a new random baby ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses a baby ID from a string.
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for BabyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BabyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a caregiver account. The coordinator receives it already
/// authenticated; it is carried for attribution only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for the device a command originated from (phone, tablet, the
/// idle reaper). Recorded in the command log to resolve who did what.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two timed activity kinds. Everything else the application records is
/// a single-shot event and never reaches this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Nursing,
    Pumping,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nursing => "nursing",
            Self::Pumping => "pumping",
        }
    }

    /// The side a fresh session opens on: nursing defaults to left, pumping
    /// has no sides.
    pub fn default_side(&self) -> Side {
        match self {
            Self::Nursing => Side::Left,
            Self::Pumping => Side::None,
        }
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side label time accumulates under. `None` is the bucket for pumping,
/// which has no side semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
    Both,
    None,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Both => "both",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of session statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller role as resolved by the external access-control layer. The engine
/// only distinguishes "may mutate" from "may only look".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Caregiver,
    Viewer,
}

/// Key a live session is addressed by. At most one session per key is live
/// at any time; different keys proceed fully independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub baby_id: BabyId,
    pub kind: ActivityKind,
}

impl SessionKey {
    pub fn new(baby_id: BabyId, kind: ActivityKind) -> Self {
        Self { baby_id, kind }
    }

    /// Stable string form used as the event-store aggregate id and as the
    /// file stem for the key's log and snapshot.
    pub fn aggregate_id(&self) -> String {
        format!("{}-{}", self.baby_id, self.kind.as_str())
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.baby_id, self.kind)
    }
}

/// UTC timestamp wrapper used across commands, events and views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    /// Returns the current UTC timestamp.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Whole seconds elapsed since `earlier`, clamped at zero. A negative
    /// span means wall clocks disagreed (device skew, NTP step); degraded
    /// accuracy beats a crashed live timer, so it folds as zero.
    pub fn saturating_secs_since(&self, earlier: &TimestampUtc) -> u64 {
        let secs = self.0.signed_duration_since(earlier.0).num_seconds();
        if secs < 0 {
            tracing::warn!(
                earlier = %earlier.0,
                later = %self.0,
                "negative elapsed span clamped to zero"
            );
            0
        } else {
            secs as u64
        }
    }
}

impl std::fmt::Display for TimestampUtc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of a finished session, handed to the external event
/// store exactly once when a session completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub kind: ActivityKind,
    /// Final per-side durations in seconds.
    pub accumulated: BTreeMap<Side, u64>,
    /// Sum of all per-side durations.
    pub total_secs: u64,
    pub started_at: TimestampUtc,
    pub stopped_at: TimestampUtc,
    /// True when the idle reaper closed the session rather than a caregiver.
    pub auto_closed: bool,
    pub note: Option<String>,
}
