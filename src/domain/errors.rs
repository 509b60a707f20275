//! Error types for the session domain.
//!
//! No error here is globally fatal; every variant is scoped to a single
//! session key and tells the caller how to recover.

use std::fmt::{Display, Formatter};

/// Errors that can occur while handling session commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Command not valid for the session's current status. Recoverable:
    /// refresh state and issue the right command.
    InvalidTransition { message: String },
    /// Optimistic-concurrency loss: the submitted expected version is stale.
    /// Always recoverable by refetch-and-retry.
    VersionConflict { expected: u64, actual: u64 },
    /// A session of this kind is already running or paused for this baby.
    SessionAlreadyActive,
    /// The per-key serialization point could not be acquired within the
    /// bounded wait. Transient; retry with backoff.
    EngineBusy,
    /// Mutating command from a viewer-role caller.
    Forbidden,
    /// Durable write failed; the command was NOT accepted and the in-memory
    /// state still matches the last durably-confirmed state.
    PersistenceFailure { message: String },
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTransition { message } => write!(f, "invalid transition: {}", message),
            Self::VersionConflict { expected, actual } => write!(
                f,
                "version conflict: submitted {}, current {}",
                expected, actual
            ),
            Self::SessionAlreadyActive => write!(f, "a session of this kind is already active"),
            Self::EngineBusy => write!(f, "session engine busy, retry"),
            Self::Forbidden => write!(f, "viewer role may not modify a session"),
            Self::PersistenceFailure { message } => write!(f, "persistence failure: {}", message),
        }
    }
}

impl std::error::Error for SessionError {}
