//! Domain model for the event-sourced session timer.
//!
//! - **Commands** (`cqrs/commands.rs`): intent from one device
//! - **Events** (`cqrs/events.rs`): accepted, durable facts
//! - **Aggregate** (`cqrs/mod.rs`): the session state machine
//! - **View** (`view.rs`): read-only projection with derived live elapsed
//! - **Actor** (`actor.rs`): per-key serialization and version checking
//! - **Services** (`services.rs`): the injected, monotonic-safe clock

pub mod actor;
pub mod cqrs;
pub mod errors;
pub mod services;
pub mod types;
pub mod view;

pub use cqrs::{SessionAggregate, SessionCommand, SessionEvent, SessionQuery};

pub use actor::{create_actor_args, SessionActor, SessionActorArgs, SessionMessage};
pub use errors::SessionError;
pub use services::{ManualTime, SessionClock, SessionServices, SystemTime, TimeSource};
pub use types::{
    ActivityKind, BabyId, CompletedSession, DeviceId, Role, SessionKey, SessionStatus, Side,
    TimestampUtc, UserId,
};
pub use view::{CommandRecord, SessionEventEnvelope, SessionSnapshot, SessionView};
