use super::*;
use crate::domain::services::{ManualTime, SessionClock};
use crate::domain::types::DeviceId;
use std::sync::Arc;

struct Harness {
    aggregate: SessionAggregate,
    time: Arc<ManualTime>,
    services: SessionServices,
}

impl Harness {
    fn new() -> Self {
        let time = ManualTime::starting_at(TimestampUtc::now());
        let services = SessionServices::with_clock(SessionClock::new(time.clone()));
        Self {
            aggregate: SessionAggregate::default(),
            time,
            services,
        }
    }

    async fn accept(&mut self, command: SessionCommand) -> Vec<SessionEvent> {
        let events = self
            .aggregate
            .handle(command, &self.services)
            .await
            .expect("command rejected");
        for event in events.clone() {
            self.aggregate.apply(event);
        }
        events
    }

    async fn reject(&mut self, command: SessionCommand) -> SessionError {
        self.aggregate
            .handle(command, &self.services)
            .await
            .expect_err("command unexpectedly accepted")
    }

    fn completed(&self) -> &CompletedSession {
        match &self.aggregate.state {
            SessionState::Completed(finished) => finished,
            other => panic!("expected completed state, got {:?}", other),
        }
    }
}

fn phone() -> DeviceId {
    DeviceId::from("phone-a")
}

fn start(kind: ActivityKind) -> SessionCommand {
    SessionCommand::Start {
        kind,
        device_id: phone(),
    }
}

fn pause() -> SessionCommand {
    SessionCommand::Pause { device_id: phone() }
}

fn resume() -> SessionCommand {
    SessionCommand::Resume { device_id: phone() }
}

fn switch(side: Side) -> SessionCommand {
    SessionCommand::SwitchSide {
        side,
        device_id: phone(),
    }
}

fn stop() -> SessionCommand {
    SessionCommand::Stop {
        device_id: phone(),
        auto_closed: false,
        note: None,
    }
}

#[tokio::test]
async fn nursing_starts_on_the_left() {
    let mut h = Harness::new();
    let events = h.accept(start(ActivityKind::Nursing)).await;

    assert!(matches!(
        events.as_slice(),
        [SessionEvent::SessionStarted {
            active_side: Side::Left,
            ..
        }]
    ));
    assert_eq!(h.aggregate.state.status(), SessionStatus::Running);
}

#[tokio::test]
async fn pumping_starts_without_a_side() {
    let mut h = Harness::new();
    let events = h.accept(start(ActivityKind::Pumping)).await;

    assert!(matches!(
        events.as_slice(),
        [SessionEvent::SessionStarted {
            active_side: Side::None,
            ..
        }]
    ));
}

#[tokio::test]
async fn start_on_a_live_session_is_rejected() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    let err = h.reject(start(ActivityKind::Nursing)).await;
    assert_eq!(err, SessionError::SessionAlreadyActive);
    assert_eq!(h.aggregate.state.status(), SessionStatus::Running);
}

#[tokio::test]
async fn pause_resume_stop_accumulates_only_running_time() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    h.time.advance_secs(90);
    h.accept(pause()).await;
    assert_eq!(h.aggregate.state.status(), SessionStatus::Paused);

    h.time.advance_secs(60);
    h.accept(resume()).await;

    h.time.advance_secs(50);
    h.accept(stop()).await;

    let finished = h.completed();
    assert_eq!(finished.accumulated.get(&Side::Left), Some(&140));
    assert_eq!(finished.total_secs, 140);
    assert!(!finished.auto_closed);
}

#[tokio::test]
async fn switching_sides_folds_into_the_side_that_ran() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    h.time.advance_secs(60);
    h.accept(switch(Side::Right)).await;

    h.time.advance_secs(120);
    h.accept(stop()).await;

    let finished = h.completed();
    assert_eq!(finished.accumulated.get(&Side::Left), Some(&60));
    assert_eq!(finished.accumulated.get(&Side::Right), Some(&120));
    assert_eq!(finished.total_secs, 180);
}

#[tokio::test]
async fn switching_to_the_current_side_is_an_accepted_no_op() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    let events = h.accept(switch(Side::Left)).await;
    assert!(events.is_empty());
    assert_eq!(h.aggregate.state.status(), SessionStatus::Running);
}

#[tokio::test]
async fn pumping_sessions_cannot_switch_sides() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Pumping)).await;

    let err = h.reject(switch(Side::Right)).await;
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[tokio::test]
async fn pause_while_paused_and_resume_while_running_are_rejected() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    let err = h.reject(resume()).await;
    assert!(matches!(err, SessionError::InvalidTransition { .. }));

    h.accept(pause()).await;
    let err = h.reject(pause()).await;
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
}

#[tokio::test]
async fn heartbeat_is_accepted_without_emitting_a_fact() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    let events = h
        .accept(SessionCommand::Heartbeat { device_id: phone() })
        .await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn stop_from_paused_freezes_without_extra_time() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;

    h.time.advance_secs(30);
    h.accept(pause()).await;

    // Time spent paused must not count.
    h.time.advance_secs(600);
    h.accept(stop()).await;

    assert_eq!(h.completed().total_secs, 30);
}

#[tokio::test]
async fn completed_sessions_reject_everything_but_start() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Nursing)).await;
    h.time.advance_secs(10);
    h.accept(stop()).await;

    let err = h.reject(pause()).await;
    assert!(matches!(err, SessionError::InvalidTransition { .. }));
    let err = h.reject(resume()).await;
    assert!(matches!(err, SessionError::InvalidTransition { .. }));

    // A new start opens a fresh session under the same key.
    h.accept(start(ActivityKind::Nursing)).await;
    assert_eq!(h.aggregate.state.status(), SessionStatus::Running);
}

#[tokio::test]
async fn stop_carries_the_note_and_auto_close_flag() {
    let mut h = Harness::new();
    h.accept(start(ActivityKind::Pumping)).await;
    h.time.advance_secs(45);
    h.accept(SessionCommand::Stop {
        device_id: DeviceId::from("reaper"),
        auto_closed: true,
        note: Some("abandoned".to_string()),
    })
    .await;

    let finished = h.completed();
    assert!(finished.auto_closed);
    assert_eq!(finished.note.as_deref(), Some("abandoned"));
    assert_eq!(finished.total_secs, 45);
}

#[test]
fn backward_event_timestamps_fold_as_zero() {
    let mut aggregate = SessionAggregate::default();
    let t0 = TimestampUtc::now();
    let earlier = TimestampUtc(t0.0 - chrono::Duration::seconds(10));

    aggregate.apply(SessionEvent::SessionStarted {
        kind: ActivityKind::Nursing,
        active_side: Side::Left,
        device_id: DeviceId::from("phone-a"),
        occurred_at: t0,
    });
    aggregate.apply(SessionEvent::SessionCompleted {
        device_id: DeviceId::from("phone-a"),
        occurred_at: earlier,
        auto_closed: false,
        note: None,
    });

    match &aggregate.state {
        SessionState::Completed(finished) => assert_eq!(finished.total_secs, 0),
        other => panic!("expected completed state, got {:?}", other),
    }
}
