use std::fs;

use simtrace_core::{EngineAdapter, EngineError, RecordingQuality, StepIndex};
use simtrace_engine_ballistic::{BallisticEngine, SceneConfig};

fn preview() -> BallisticEngine {
    BallisticEngine::new(SceneConfig::cpu_preview()).expect("valid scene")
}

#[test]
fn snapshot_reports_every_particle_with_stable_ids() {
    let mut engine = preview();
    let before = engine.snapshot().expect("snapshot");
    engine.advance().expect("advance");
    let after = engine.snapshot().expect("snapshot");

    assert_eq!(before.len(), after.len());
    for (first, second) in before.iter().zip(&after) {
        assert_eq!(first.id, second.id);
    }
    assert!(after[0].velocity.z < 0.0, "gravity pulls particles down");
}

#[test]
fn runs_are_deterministic() {
    let mut first = preview();
    let mut second = preview();
    for _ in 0..50 {
        first.advance().expect("advance");
        second.advance().expect("advance");
    }
    assert_eq!(first.particles(), second.particles());
}

#[test]
fn recording_decimates_by_quality() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cases = [
        (RecordingQuality::Low, 3),
        (RecordingQuality::Medium, 5),
        (RecordingQuality::High, 10),
    ];

    for (quality, expected) in cases {
        let path = dir.path().join(format!("{quality}.jsonl"));
        let mut engine = preview();
        engine.start_recording(&path, quality).expect("start");
        for _ in 0..10 {
            engine.advance().expect("advance");
        }
        engine.stop_recording().expect("stop");

        let contents = fs::read_to_string(&path).expect("recording readable");
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), expected, "{quality}");
        assert_eq!(lines[0]["step"], 0);
        assert_eq!(lines[0]["particles"], 8);
    }
}

#[test]
fn recording_cannot_start_twice_or_stop_when_idle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut engine = preview();

    assert!(matches!(
        engine.stop_recording(),
        Err(EngineError::Recording { .. })
    ));

    engine
        .start_recording(&dir.path().join("a.jsonl"), RecordingQuality::High)
        .expect("start");
    assert!(matches!(
        engine.start_recording(&dir.path().join("b.jsonl"), RecordingQuality::High),
        Err(EngineError::Recording { .. })
    ));
    engine.stop_recording().expect("stop");
}

#[test]
fn frames_are_written_as_png() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("frame_000000.png");
    let mut engine = preview();

    engine.render_frame(&path).expect("render");

    let bytes = fs::read(&path).expect("frame readable");
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
}

#[test]
fn rendering_into_a_missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("missing").join("frame.png");
    let mut engine = preview();

    let error = engine.render_frame(&path).expect_err("no directory");
    assert!(matches!(error, EngineError::Io { .. }), "{error:?}");
}

#[test]
fn checkpoints_restore_the_exact_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("final_state.ckpt");
    let mut engine = preview();
    for _ in 0..25 {
        engine.advance().expect("advance");
    }
    engine.save_checkpoint(&path).expect("save");

    let mut restored = BallisticEngine::restore(&path).expect("restore");
    assert_eq!(restored.step(), StepIndex::new(25));
    assert_eq!(restored.particles(), engine.particles());
    assert_eq!(restored.scene(), engine.scene());

    engine.advance().expect("advance");
    restored.advance().expect("advance");
    assert_eq!(restored.particles(), engine.particles());
}

#[test]
fn foreign_checkpoints_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("other.ckpt");
    fs::write(&path, r#"{"format":"other","version":1,"state":null}"#).expect("write");

    let error = BallisticEngine::restore(&path).expect_err("rejected");
    assert!(matches!(error, EngineError::Checkpoint { .. }));
}

#[test]
fn injected_fault_stops_advance_at_the_step() {
    let mut engine = preview().with_fault_at(StepIndex::new(3));
    for _ in 0..3 {
        engine.advance().expect("advance");
    }

    let error = engine.advance().expect_err("fault");
    assert!(matches!(
        error,
        EngineError::Solver { step, .. } if step == StepIndex::new(3)
    ));
    assert_eq!(engine.step(), StepIndex::new(3));
}

#[test]
fn timestep_comes_from_the_scene() {
    let engine = BallisticEngine::new(SceneConfig::gpu_reservoir()).expect("valid scene");
    assert_eq!(engine.timestep(), 1.5e-3);
}

#[test]
fn checkpoints_with_unbounded_lattices_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tampered.ckpt");
    let mut engine = preview();
    engine.save_checkpoint(&path).expect("save");

    let contents = fs::read_to_string(&path).expect("checkpoint readable");
    assert!(contents.contains("\"spacing\":0.1"));
    fs::write(&path, contents.replace("\"spacing\":0.1", "\"spacing\":1e-300"))
        .expect("rewrite");

    let error = BallisticEngine::restore(&path).expect_err("rejected");
    assert!(matches!(error, EngineError::Checkpoint { .. }), "{error:?}");
}
