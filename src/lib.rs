//! Session timer and reconciliation engine for timed infant-care activities.
//!
//! Nursing and pumping are not point-in-time records but live sessions with a
//! running duration that can be started, paused, resumed, switched between
//! sides and eventually stopped, possibly from several devices at once. This
//! crate owns that one hard problem: an event-sourced state machine per
//! (baby, activity-kind) key, serialized behind an actor, persisted to an
//! append-only log so the final stored duration is correct no matter how many
//! times a client crashed or raced another device.
//!
//! The CRUD side of the surrounding application (diapers, sleep, activities)
//! is out of scope; finished sessions are handed to it through the
//! [`coordinator::FinishedEventSink`] seam.

pub mod config;
pub mod coordinator;
pub mod domain;
pub mod event_store;
pub mod registry;

pub use config::EngineConfig;
pub use coordinator::{AuthContext, FinishedEventSink, SessionCoordinator};
pub use domain::errors::SessionError;
pub use domain::view::{SessionSnapshot, SessionView};
pub use registry::SessionRegistry;
