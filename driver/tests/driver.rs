use std::{collections::BTreeSet, fs, io, path::Path};

use simtrace_core::{
    scripted::ScriptedEngine, EngineError, ErrorClass, RecordingQuality, StateRecord,
};
use simtrace_driver::{Driver, RunConfig, RunErrorKind, RunLength, RunState};
use simtrace_system_telemetry::{read_log, CsvLog, RecordLog, TelemetryError};

/// CSV log that accepts a fixed number of batches and then fails to write.
struct ExhaustibleLog {
    inner: CsvLog,
    batches_left: usize,
    attempts: usize,
}

impl RecordLog for ExhaustibleLog {
    fn append(&mut self, records: &[StateRecord]) -> Result<(), TelemetryError> {
        self.attempts += 1;
        if self.batches_left == 0 {
            return Err(TelemetryError::Io {
                path: self.inner.path().to_path_buf(),
                source: io::Error::new(io::ErrorKind::Other, "no space left on device"),
            });
        }
        self.batches_left -= 1;
        self.inner.append(records)
    }
}

fn scenario_config(results: &Path) -> RunConfig {
    let mut config = RunConfig::new(results, RunLength::Steps(10));
    config.output_interval = 2;
    config.frame_interval = Some(4);
    config.buffer_capacity = 3;
    config.recording_quality = Some(RecordingQuality::Medium);
    config
}

fn exported_steps(log: &Path) -> BTreeSet<u64> {
    read_log(log)
        .expect("readable log")
        .iter()
        .map(|record| record.step().get())
        .collect()
}

#[test]
fn completed_run_produces_every_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());
    let final_path = dir.path().join("final_state.ckpt");
    let partial_path = dir.path().join("partial_state.ckpt");

    let mut driver = Driver::new(ScriptedEngine::new(2), config).expect("valid config");
    let report = driver.run().expect("run completes");

    assert_eq!(driver.state(), RunState::Completed);
    assert_eq!(report.steps_advanced, 10);
    assert_eq!(report.exported_steps, 5);
    assert_eq!(report.rows_written, 10);
    assert!(report.flushes >= 4, "flushed {} times", report.flushes);
    assert_eq!(report.frames_captured, 3);
    assert_eq!(report.checkpoint, final_path);

    assert_eq!(
        exported_steps(&report.log_path),
        BTreeSet::from([0, 2, 4, 6, 8])
    );
    for step in [0, 4, 8] {
        assert!(dir.path().join(format!("frame_{step:06}.png")).exists());
    }
    assert!(!dir.path().join("frame_000002.png").exists());
    assert!(final_path.exists());
    assert!(!partial_path.exists());

    let engine = driver.into_engine();
    assert_eq!(engine.start_calls, 1);
    assert_eq!(engine.stop_calls, 1);
    assert!(!engine.is_recording());
}

#[test]
fn every_row_lands_on_the_output_cadence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = RunConfig::new(dir.path(), RunLength::Steps(37));
    config.output_interval = 5;
    config.frame_interval = Some(100);
    config.buffer_capacity = 4;

    let mut driver = Driver::new(ScriptedEngine::new(3), config).expect("valid config");
    let report = driver.run().expect("run completes");

    let rows = read_log(&report.log_path).expect("readable log");
    assert_eq!(rows.len() as u64, report.exported_steps * 3);
    assert_eq!(report.exported_steps, 8);
    assert!(rows.iter().all(|row| row.step().get() % 5 == 0));
    assert_eq!(report.frames_captured, 1);
}

#[test]
fn failing_advance_leaves_forensic_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());
    let final_path = dir.path().join("final_state.ckpt");
    fs::write(&final_path, "previous good run").expect("seed earlier checkpoint");

    let mut driver = Driver::new(ScriptedEngine::new(2).failing_advance_at(5), config)
        .expect("valid config");
    let error = driver.run().expect_err("run fails");

    assert_eq!(driver.state(), RunState::Failed);
    assert_eq!(error.step().map(|step| step.get()), Some(5));
    assert_eq!(error.class(), ErrorClass::Engine);
    assert!(matches!(
        error.kind(),
        RunErrorKind::Engine(EngineError::Solver { .. })
    ));
    assert_eq!(
        error.checkpoint(),
        Some(&dir.path().join("partial_state.ckpt"))
    );

    let log = dir.path().join("particle_state_log.csv");
    assert_eq!(read_log(&log).expect("readable log").len(), 6);
    assert_eq!(exported_steps(&log), BTreeSet::from([0, 2, 4]));
    assert!(dir.path().join("partial_state.ckpt").exists());
    assert_eq!(
        fs::read_to_string(&final_path).expect("final readable"),
        "previous good run"
    );

    let engine = driver.into_engine();
    assert_eq!(engine.steps(), 5);
    assert!(!engine.is_recording(), "session closed on the failure path");
    assert_eq!(engine.stop_calls, 1);
    assert_eq!(engine.checkpoints.len(), 1);
}

#[test]
fn render_failures_end_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());

    let mut driver =
        Driver::new(ScriptedEngine::new(2).failing_render(), config).expect("valid config");
    let error = driver.run().expect_err("run fails");

    assert_eq!(error.step().map(|step| step.get()), Some(0));
    assert!(matches!(
        error.kind(),
        RunErrorKind::Engine(EngineError::Render { .. })
    ));
    assert!(dir.path().join("partial_state.ckpt").exists());
    assert!(!dir.path().join("final_state.ckpt").exists());
}

#[test]
fn failing_stop_on_success_path_yields_partial_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());

    let mut driver =
        Driver::new(ScriptedEngine::new(1).failing_stop(), config).expect("valid config");
    let error = driver.run().expect_err("closing fails");

    assert!(matches!(error.kind(), RunErrorKind::Recording(_)));
    assert!(error.step().is_none());
    assert!(dir.path().join("partial_state.ckpt").exists());
    assert!(!dir.path().join("final_state.ckpt").exists());
    assert_eq!(driver.into_engine().stop_calls, 1);
}

#[test]
fn failing_final_checkpoint_is_reported_without_retry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());

    let mut driver =
        Driver::new(ScriptedEngine::new(1).failing_checkpoint(), config).expect("valid config");
    let error = driver.run().expect_err("checkpoint fails");

    assert!(matches!(error.kind(), RunErrorKind::Checkpoint(_)));
    assert_eq!(driver.state(), RunState::Failed);
    assert!(driver.engine().checkpoints.is_empty());
}

#[test]
fn second_run_replaces_the_first_runs_log() {
    let dir = tempfile::tempdir().expect("tempdir");

    let mut first = Driver::new(ScriptedEngine::new(4), scenario_config(dir.path()))
        .expect("valid config");
    let first_report = first.run().expect("first run");
    assert_eq!(first_report.rows_written, 20);

    let mut config = scenario_config(dir.path());
    config.run_length = RunLength::Steps(3);
    let mut second = Driver::new(ScriptedEngine::new(1), config).expect("valid config");
    let second_report = second.run().expect("second run");

    let rows = read_log(&second_report.log_path).expect("readable log");
    assert_eq!(rows.len(), 2);
    assert_eq!(exported_steps(&second_report.log_path), BTreeSet::from([0, 2]));
}

#[test]
fn disabled_recording_skips_the_encoder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = scenario_config(dir.path());
    config.recording_quality = None;

    let mut driver = Driver::new(ScriptedEngine::new(1), config).expect("valid config");
    let _ = driver.run().expect("run completes");

    let engine = driver.into_engine();
    assert_eq!(engine.start_calls, 0);
    assert_eq!(engine.stop_calls, 0);
    assert!(!dir.path().join("recording.jsonl").exists());
}

#[test]
fn duration_runs_use_the_engine_timestep() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = scenario_config(dir.path());
    // The scripted engine advances 0.25 s per step.
    config.run_length = RunLength::SimulatedSeconds(3.0);

    let mut driver = Driver::new(ScriptedEngine::new(1), config).expect("valid config");
    let report = driver.run().expect("run completes");

    assert_eq!(report.steps_advanced, 12);
}

#[test]
fn failing_snapshot_ends_the_run_with_a_partial_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());

    let mut driver = Driver::new(ScriptedEngine::new(2).failing_snapshot_at(4), config)
        .expect("valid config");
    let error = driver.run().expect_err("run fails");

    assert_eq!(driver.state(), RunState::Failed);
    assert_eq!(error.step().map(|step| step.get()), Some(4));
    assert_eq!(error.class(), ErrorClass::Engine);
    assert!(matches!(
        error.kind(),
        RunErrorKind::Engine(EngineError::Snapshot { .. })
    ));
    assert_eq!(
        error.checkpoint(),
        Some(&dir.path().join("partial_state.ckpt"))
    );

    let log = dir.path().join("particle_state_log.csv");
    assert_eq!(read_log(&log).expect("readable log").len(), 4);
    assert_eq!(exported_steps(&log), BTreeSet::from([0, 2]));
    assert!(!dir.path().join("final_state.ckpt").exists());

    let engine = driver.into_engine();
    assert_eq!(engine.steps(), 5);
    assert_eq!(engine.stop_calls, 1);
    assert!(!engine.is_recording());
}

#[test]
fn log_write_failure_is_an_io_failure_with_a_partial_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());
    let log_path = config.log_path();

    let mut driver = Driver::new(ScriptedEngine::new(2), config).expect("valid config");
    let error = driver
        .run_with_log(|path| {
            Ok(ExhaustibleLog {
                inner: CsvLog::create(path)?,
                batches_left: 1,
                attempts: 0,
            })
        })
        .expect_err("second batch fails");

    assert_eq!(driver.state(), RunState::Failed);
    assert_eq!(error.class(), ErrorClass::Io);
    assert_eq!(error.step().map(|step| step.get()), Some(4));
    assert!(matches!(
        error.kind(),
        RunErrorKind::Telemetry(TelemetryError::Io { .. })
    ));
    assert_eq!(
        error.checkpoint(),
        Some(&dir.path().join("partial_state.ckpt"))
    );
    assert!(!dir.path().join("final_state.ckpt").exists());

    // Only the batch written before the failure reaches the log.
    let rows = read_log(&log_path).expect("readable log");
    assert_eq!(rows.len(), 3);
    assert_eq!(exported_steps(&log_path), BTreeSet::from([0, 2]));

    let engine = driver.into_engine();
    assert_eq!(engine.stop_calls, 1);
    assert!(!engine.is_recording());
}

#[test]
fn poisoned_log_is_not_written_again_on_cleanup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = scenario_config(dir.path());
    let mut attempts = None;

    let mut driver = Driver::new(ScriptedEngine::new(2), config).expect("valid config");
    let _ = driver
        .run_with_log(|path| {
            Ok(CountingLog {
                inner: ExhaustibleLog {
                    inner: CsvLog::create(path)?,
                    batches_left: 0,
                    attempts: 0,
                },
                seen: &mut attempts,
            })
        })
        .expect_err("first batch fails");

    assert_eq!(attempts, Some(1));
}

/// Reports how many appends the wrapped log saw once the driver drops it.
struct CountingLog<'a> {
    inner: ExhaustibleLog,
    seen: &'a mut Option<usize>,
}

impl RecordLog for CountingLog<'_> {
    fn append(&mut self, records: &[StateRecord]) -> Result<(), TelemetryError> {
        let result = self.inner.append(records);
        *self.seen = Some(self.inner.attempts);
        result
    }
}

#[test]
fn runs_without_a_frame_interval_render_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = scenario_config(dir.path());
    config.frame_interval = None;

    let mut driver = Driver::new(ScriptedEngine::new(1), config).expect("valid config");
    let report = driver.run().expect("run completes");

    assert_eq!(report.frames_captured, 0);
    assert!(driver.engine().rendered.is_empty());
    assert!(!dir.path().join("frame_000000.png").exists());
}
