use simtrace_core::{scripted::ScriptedEngine, RecordingQuality};
use simtrace_system_recording::{
    RecordingPlan, RecordingSession, ScopedRecording, SessionError, SessionState,
};

#[test]
fn close_is_idempotent_after_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("recording.jsonl");
    let mut engine = ScriptedEngine::new(1);
    let mut session = RecordingSession::new();

    session
        .open(&mut engine, &path, RecordingQuality::Medium)
        .expect("open");
    assert_eq!(session.state(), SessionState::Open);

    for _ in 0..3 {
        session.close(&mut engine).expect("close never errors");
    }

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(engine.start_calls, 1);
    assert_eq!(engine.stop_calls, 1, "engine released exactly once");
}

#[test]
fn closing_a_never_opened_session_is_a_no_op() {
    let mut engine = ScriptedEngine::new(1);
    let mut session = RecordingSession::new();

    session.close(&mut engine).expect("no-op close");
    assert_eq!(engine.stop_calls, 0);
}

#[test]
fn opening_twice_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("recording.jsonl");
    let mut engine = ScriptedEngine::new(1);
    let mut session = RecordingSession::new();

    session
        .open(&mut engine, &path, RecordingQuality::Low)
        .expect("first open");
    let error = session
        .open(&mut engine, &path, RecordingQuality::Low)
        .expect_err("second open must fail");

    assert!(matches!(error, SessionError::AlreadyOpen { .. }));
    assert_eq!(engine.start_calls, 1);
}

#[test]
fn failing_stop_still_leaves_the_session_closed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("recording.jsonl");
    let mut engine = ScriptedEngine::new(1).failing_stop();
    let mut session = RecordingSession::new();

    session
        .open(&mut engine, &path, RecordingQuality::High)
        .expect("open");
    let error = session.close(&mut engine).expect_err("stop fails");
    assert!(matches!(error, SessionError::Engine(_)));
    assert_eq!(session.state(), SessionState::Closed);

    session.close(&mut engine).expect("second close is a no-op");
    assert_eq!(engine.stop_calls, 1);
}

#[test]
fn scoped_recording_closes_on_drop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan = RecordingPlan::Enabled {
        path: dir.path().join("recording.jsonl"),
        quality: RecordingQuality::Medium,
    };
    let mut engine = ScriptedEngine::new(2);

    {
        let mut scoped = ScopedRecording::open(&mut engine, &plan).expect("open");
        assert!(scoped.session().is_open());
        assert!(scoped.engine().is_recording());
    }

    assert!(!engine.is_recording());
    assert_eq!(engine.stop_calls, 1);
}

#[test]
fn scoped_recording_closes_when_the_body_panics() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan = RecordingPlan::Enabled {
        path: dir.path().join("recording.jsonl"),
        quality: RecordingQuality::Medium,
    };
    let mut engine = ScriptedEngine::new(2);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _scoped = ScopedRecording::open(&mut engine, &plan).expect("open");
        panic!("step exploded");
    }));

    assert!(outcome.is_err());
    assert!(!engine.is_recording());
    assert_eq!(engine.stop_calls, 1);
}

#[test]
fn explicit_close_prevents_a_second_release_on_drop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan = RecordingPlan::Enabled {
        path: dir.path().join("recording.jsonl"),
        quality: RecordingQuality::Low,
    };
    let mut engine = ScriptedEngine::new(1);

    ScopedRecording::open(&mut engine, &plan)
        .expect("open")
        .close()
        .expect("close");

    assert_eq!(engine.start_calls, 1);
    assert_eq!(engine.stop_calls, 1);
}

#[test]
fn disabled_plan_never_touches_the_encoder() {
    let mut engine = ScriptedEngine::new(1);

    let scoped = ScopedRecording::open(&mut engine, &RecordingPlan::Disabled).expect("open");
    assert_eq!(scoped.session().state(), SessionState::Closed);
    scoped.close().expect("close");

    assert_eq!(engine.start_calls, 0);
    assert_eq!(engine.stop_calls, 0);
}
