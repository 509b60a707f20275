use crate::config::EngineConfig;
use crate::coordinator::{AuthContext, FinishedEventSink, SessionCoordinator};
use crate::domain::errors::SessionError;
use crate::domain::services::{ManualTime, SessionClock, SessionServices};
use crate::domain::types::{
    ActivityKind, BabyId, CompletedSession, DeviceId, Role, SessionKey, SessionStatus, Side,
    TimestampUtc, UserId,
};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use uuid::Uuid;

#[derive(Default)]
struct RecordingSink {
    records: Mutex<Vec<(BabyId, ActivityKind, CompletedSession)>>,
}

impl RecordingSink {
    fn records(&self) -> Vec<(BabyId, ActivityKind, CompletedSession)> {
        self.records.lock().expect("sink lock").clone()
    }
}

#[async_trait]
impl FinishedEventSink for RecordingSink {
    async fn record_finished(
        &self,
        baby_id: &BabyId,
        kind: ActivityKind,
        finished: &CompletedSession,
    ) -> anyhow::Result<()> {
        self.records
            .lock()
            .expect("sink lock")
            .push((*baby_id, kind, finished.clone()));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl FinishedEventSink for FailingSink {
    async fn record_finished(
        &self,
        _baby_id: &BabyId,
        _kind: ActivityKind,
        _finished: &CompletedSession,
    ) -> anyhow::Result<()> {
        anyhow::bail!("record store unavailable")
    }
}

fn harness(data_dir: &Path) -> (SessionCoordinator, Arc<ManualTime>, Arc<RecordingSink>) {
    let time = ManualTime::starting_at(TimestampUtc::now());
    let services = SessionServices::with_clock(SessionClock::new(time.clone()));
    let sink = Arc::new(RecordingSink::default());
    let coordinator = SessionCoordinator::new(
        data_dir.to_path_buf(),
        EngineConfig::default(),
        services,
        sink.clone(),
    );
    (coordinator, time, sink)
}

fn caregiver() -> AuthContext {
    AuthContext::new(UserId(Uuid::new_v4()), Role::Caregiver)
}

fn viewer() -> AuthContext {
    AuthContext::new(UserId(Uuid::new_v4()), Role::Viewer)
}

fn device(name: &str) -> DeviceId {
    DeviceId::from(name)
}

#[tokio::test]
async fn viewer_may_query_but_not_mutate() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, _, _) = harness(dir.path());
    let key = SessionKey::new(BabyId::new(), ActivityKind::Nursing);

    let err = coordinator
        .start(&viewer(), &key, device("tablet"), 0)
        .await
        .expect_err("viewer start should fail");
    assert_eq!(err, SessionError::Forbidden);

    let snapshot = coordinator
        .query(&viewer(), &key)
        .await
        .expect("viewer query should succeed");
    assert_eq!(snapshot.status, SessionStatus::Idle);
}

#[tokio::test]
async fn live_elapsed_is_derived_from_the_clock() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, time, _) = harness(dir.path());
    let auth = caregiver();
    let key = SessionKey::new(BabyId::new(), ActivityKind::Nursing);

    coordinator
        .start(&auth, &key, device("phone"), 0)
        .await
        .expect("start failed");

    time.advance_secs(30);
    let snapshot = coordinator.query(&auth, &key).await.expect("query failed");
    assert_eq!(snapshot.live_elapsed_secs, 30);
    assert_eq!(snapshot.version, 1);

    // Pausing freezes the figure.
    coordinator
        .pause(&auth, &key, device("phone"), 1)
        .await
        .expect("pause failed");
    time.advance_secs(300);
    let snapshot = coordinator.query(&auth, &key).await.expect("query failed");
    assert_eq!(snapshot.live_elapsed_secs, 30);
    assert_eq!(snapshot.status, SessionStatus::Paused);
}

#[tokio::test]
async fn stop_hands_finished_record_to_sink_once() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, time, sink) = harness(dir.path());
    let auth = caregiver();
    let key = SessionKey::new(BabyId::new(), ActivityKind::Nursing);

    coordinator
        .start(&auth, &key, device("phone"), 0)
        .await
        .expect("start failed");
    time.advance_secs(60);
    coordinator
        .switch_side(&auth, &key, Side::Right, device("phone"), 1)
        .await
        .expect("switch failed");
    time.advance_secs(120);
    let snapshot = coordinator
        .stop(&auth, &key, device("phone"), Some("fussy".to_string()), 2)
        .await
        .expect("stop failed");

    assert_eq!(snapshot.status, SessionStatus::Completed);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let (baby_id, kind, finished) = &records[0];
    assert_eq!(*baby_id, key.baby_id);
    assert_eq!(*kind, ActivityKind::Nursing);
    assert_eq!(finished.total_secs, 180);
    assert_eq!(finished.accumulated.get(&Side::Left), Some(&60));
    assert_eq!(finished.accumulated.get(&Side::Right), Some(&120));
    assert!(!finished.auto_closed);
    assert_eq!(finished.note.as_deref(), Some("fussy"));
}

#[tokio::test]
async fn sink_failure_does_not_undo_the_completed_session() {
    let dir = tempdir().expect("temp dir");
    let time = ManualTime::starting_at(TimestampUtc::now());
    let services = SessionServices::with_clock(SessionClock::new(time.clone()));
    let coordinator = SessionCoordinator::new(
        dir.path().to_path_buf(),
        EngineConfig::default(),
        services,
        Arc::new(FailingSink),
    );
    let auth = caregiver();
    let key = SessionKey::new(BabyId::new(), ActivityKind::Pumping);

    coordinator
        .start(&auth, &key, device("phone"), 0)
        .await
        .expect("start failed");
    time.advance_secs(45);
    let snapshot = coordinator
        .stop(&auth, &key, device("phone"), None, 1)
        .await
        .expect("stop should succeed despite the sink");

    assert_eq!(snapshot.status, SessionStatus::Completed);
    let finished = snapshot.completed.expect("completed record");
    assert_eq!(finished.total_secs, 45);
}

#[tokio::test]
async fn second_start_on_live_key_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, _, _) = harness(dir.path());
    let auth = caregiver();
    let key = SessionKey::new(BabyId::new(), ActivityKind::Nursing);

    coordinator
        .start(&auth, &key, device("phone-a"), 0)
        .await
        .expect("start failed");

    let err = coordinator
        .start(&auth, &key, device("phone-b"), 1)
        .await
        .expect_err("second start should fail");
    assert_eq!(err, SessionError::SessionAlreadyActive);
}

#[tokio::test]
async fn heartbeat_keeps_the_version_unchanged() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, _, _) = harness(dir.path());
    let auth = caregiver();
    let key = SessionKey::new(BabyId::new(), ActivityKind::Nursing);

    coordinator
        .start(&auth, &key, device("phone"), 0)
        .await
        .expect("start failed");

    let snapshot = coordinator
        .heartbeat(&auth, &key, device("phone"), 1)
        .await
        .expect("heartbeat failed");
    assert_eq!(snapshot.version, 1);
    assert_eq!(snapshot.command_log.len(), 1);
}

#[tokio::test]
async fn start_reaps_a_paused_session_past_the_ceiling() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, time, sink) = harness(dir.path());
    let auth = caregiver();
    let key = SessionKey::new(BabyId::new(), ActivityKind::Nursing);

    coordinator
        .start(&auth, &key, device("phone"), 0)
        .await
        .expect("start failed");
    time.advance_secs(600);
    coordinator
        .pause(&auth, &key, device("phone"), 1)
        .await
        .expect("pause failed");

    // The default ceiling is 12 hours; the phone comes back the next day.
    time.advance_secs(13 * 3600);
    let snapshot = coordinator
        .start(&auth, &key, device("phone"), 2)
        .await
        .expect("start after reap failed");

    assert_eq!(snapshot.status, SessionStatus::Running);
    assert_eq!(snapshot.live_elapsed_secs, 0);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let (_, _, finished) = &records[0];
    assert!(finished.auto_closed);
    assert_eq!(finished.total_secs, 600);
}

#[tokio::test]
async fn reap_sweep_closes_only_expired_sessions() {
    let dir = tempdir().expect("temp dir");
    let (coordinator, time, sink) = harness(dir.path());
    let auth = caregiver();
    let stale = SessionKey::new(BabyId::new(), ActivityKind::Nursing);
    let fresh = SessionKey::new(BabyId::new(), ActivityKind::Pumping);

    coordinator
        .start(&auth, &stale, device("phone-a"), 0)
        .await
        .expect("start failed");
    coordinator
        .pause(&auth, &stale, device("phone-a"), 1)
        .await
        .expect("pause failed");

    time.advance_secs(13 * 3600);
    coordinator
        .start(&auth, &fresh, device("phone-b"), 0)
        .await
        .expect("start failed");

    let reaped = coordinator.reap_expired().await;
    assert_eq!(reaped, vec![stale]);
    assert_eq!(sink.records().len(), 1);

    let snapshot = coordinator
        .query(&auth, &fresh)
        .await
        .expect("query failed");
    assert_eq!(snapshot.status, SessionStatus::Running);
}
