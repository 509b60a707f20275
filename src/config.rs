//! Engine configuration.
//!
//! Everything has a default so the engine runs unconfigured; hosts embed
//! this struct in their own config file and override per field.

use serde::{Deserialize, Serialize};

/// Tunables for the session engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Minimum seconds between non-boundary durable snapshots. Segment
    /// boundaries (pause, side switch, stop) always snapshot regardless.
    #[serde(default = "default_snapshot_min_interval_secs")]
    pub snapshot_min_interval_secs: i64,

    /// How long a submit may wait on the per-key serialization point before
    /// failing with `EngineBusy`.
    #[serde(default = "default_submit_timeout_ms")]
    pub submit_timeout_ms: u64,

    /// A paused session older than this many hours is auto-stopped by the
    /// reaper so an abandoned session cannot block new ones.
    #[serde(default = "default_paused_ceiling_hours")]
    pub paused_ceiling_hours: i64,

    /// Capacity of the per-session event broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            snapshot_min_interval_secs: default_snapshot_min_interval_secs(),
            submit_timeout_ms: default_submit_timeout_ms(),
            paused_ceiling_hours: default_paused_ceiling_hours(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_snapshot_min_interval_secs() -> i64 {
    15
}

fn default_submit_timeout_ms() -> u64 {
    2_000
}

fn default_paused_ceiling_hours() -> i64 {
    12
}

fn default_channel_capacity() -> usize {
    64
}
