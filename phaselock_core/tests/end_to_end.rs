//! Spectra in, stage commands out.
use phaselock_core::mocks::{RecordingStage, StageCall};
use phaselock_core::util::{synthetic_counts, uniform_axis};
use phaselock_core::{
    ActuatorCfg, ConfigMailbox, EstimatorState, FitParameters, Frame, FrameBuffer, LoopInputs,
    PhaseLock, RunExit, StepOutcome, StreamPump, StreamReader, WavelengthRange,
};
use phaselock_traits::clock::test_clock::TestClock;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

const PEAK: f64 = 20_000.0;

fn axis() -> Vec<f64> {
    uniform_axis(780.0, 0.1, 400)
}

fn frame_at(phase_deg: f64, timestamp: &str) -> Frame {
    let truth = FitParameters {
        phase_rad: phase_deg.to_radians(),
        ..FitParameters::default()
    };
    Frame {
        timestamp: timestamp.into(),
        device_index: 0,
        counts: synthetic_counts(&axis(), &truth, PEAK),
    }
}

fn lock(stage: RecordingStage, clock: &TestClock) -> PhaseLock {
    PhaseLock::builder()
        .with_stage(stage)
        .with_wavelengths(axis())
        .with_range(WavelengthRange::new(780.0, 820.0))
        .with_actuator(ActuatorCfg {
            settle: Duration::from_millis(100),
            ..ActuatorCfg::default()
        })
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

#[test]
fn locked_phase_holds_then_drift_is_corrected() {
    let stage = RecordingStage::new();
    let clock = TestClock::new();
    let mut pl = lock(stage.clone(), &clock);

    let StepOutcome::Applied(first) = pl.step(1, &frame_at(0.0, "t0")).unwrap() else {
        panic!("first frame skipped");
    };
    assert!(first.full_fit);
    assert!(first.phase_rad.abs() < 1e-3, "{first:?}");
    assert_eq!(first.delta_deg, 0.0);
    assert!(first.r_squared > 0.99);
    assert!(stage.calls().is_empty());
    assert_eq!(pl.estimator().state(), EstimatorState::Tracking);

    let StepOutcome::Applied(second) = pl.step(2, &frame_at(30.0, "t1")).unwrap() else {
        panic!("second frame skipped");
    };
    assert!(!second.full_fit);
    // Phase-only refit against the first fit's envelope recovers about 30°.
    assert!((second.delta_deg + 7.5).abs() < 0.25, "{second:?}");
    assert_eq!(stage.calls().len(), 1);
    assert!((pl.position() - second.delta_deg).abs() < 1e-12);
    assert_eq!(clock.elapsed(), Duration::from_millis(100));
}

#[test]
fn unusable_frames_are_skipped_without_motion() {
    let stage = RecordingStage::new();
    let clock = TestClock::new();
    let mut pl = lock(stage.clone(), &clock);

    let dark = Frame {
        timestamp: "dark".into(),
        device_index: 0,
        counts: vec![0; 400],
    };
    assert!(matches!(pl.step(1, &dark).unwrap(), StepOutcome::Skipped(_)));
    let short = Frame {
        timestamp: "short".into(),
        device_index: 0,
        counts: vec![1; 10],
    };
    assert!(matches!(pl.step(2, &short).unwrap(), StepOutcome::Skipped(_)));
    assert_eq!(pl.estimator().state(), EstimatorState::Uninitialized);
    assert!(stage.calls().is_empty());
}

#[test]
fn run_processes_the_last_frame_before_ending() {
    let stage = RecordingStage::new();
    let clock = TestClock::new();
    let mut pl = lock(stage, &clock);
    let buffer = FrameBuffer::new();
    buffer.update(frame_at(0.0, "only"));
    let shutdown = AtomicBool::new(false);
    let mut finished = || true;

    let mut seen = Vec::new();
    let (exit, summary) = pl
        .run(
            LoopInputs {
                buffer: &buffer,
                mailbox: None,
                source_finished: &mut finished,
                shutdown: &shutdown,
            },
            &mut |s| seen.push(s.timestamp.clone()),
        )
        .unwrap();

    assert_eq!(exit, RunExit::StreamEnded);
    assert_eq!(summary.frames_processed, 1);
    assert_eq!(summary.last_seq, 1);
    assert_eq!(seen, vec!["only".to_string()]);
}

#[test]
fn shutdown_flag_stops_before_processing() {
    let clock = TestClock::new();
    let mut pl = lock(RecordingStage::new(), &clock);
    let buffer = FrameBuffer::new();
    buffer.update(frame_at(0.0, "late"));
    let shutdown = AtomicBool::new(true);
    let mut finished = || false;

    let (exit, summary) = pl
        .run(
            LoopInputs {
                buffer: &buffer,
                mailbox: None,
                source_finished: &mut finished,
                shutdown: &shutdown,
            },
            &mut |_| {},
        )
        .unwrap();
    assert_eq!(exit, RunExit::Shutdown);
    assert_eq!(summary.frames_processed, 0);
}

#[test]
fn actuator_fault_ends_the_run() {
    let stage = RecordingStage::new();
    stage.fail_next_move("stage unplugged");
    let clock = TestClock::new();
    let mut pl = lock(stage.clone(), &clock);

    // Lock onto phase 0 first, then request a move that fails.
    pl.step(1, &frame_at(0.0, "a")).unwrap();
    let buffer = FrameBuffer::new();
    buffer.update(frame_at(0.0, "b"));
    buffer.update(frame_at(30.0, "c"));
    let shutdown = AtomicBool::new(false);
    let mut finished = || true;

    let err = pl
        .run(
            LoopInputs {
                buffer: &buffer,
                mailbox: None,
                source_finished: &mut finished,
                shutdown: &shutdown,
            },
            &mut |_| {},
        )
        .unwrap_err();
    assert!(err.to_string().contains("stage unplugged"), "{err}");
    assert!(stage.calls().is_empty());
}

#[test]
fn stream_to_stage_through_the_pump() {
    let meta = r#"{"type":"meta","device_index":0,"num_pixels":400,"wavelengths":null}"#;
    let mut input = format!("{meta}\n");
    for i in 0..3 {
        let line = serde_json::json!({
            "type": "frame",
            "timestamp": format!("t{i}"),
            "device_index": 0,
            "counts": frame_at(0.0, "").counts,
        });
        input.push_str(&line.to_string());
        input.push('\n');
    }
    input.push_str("not json\n");

    let (meta, reader) = StreamReader::connect(Cursor::new(input)).unwrap();
    assert_eq!(meta.num_pixels, 400);
    let buffer = Arc::new(FrameBuffer::new());
    let mailbox = Arc::new(ConfigMailbox::new());
    let mut pump = StreamPump::spawn(reader, buffer.clone(), mailbox.clone());

    let stage = RecordingStage::new();
    let clock = TestClock::new();
    let mut pl = lock(stage, &clock);
    let shutdown = AtomicBool::new(false);
    let mut finished = || pump.is_finished();
    let (exit, summary) = pl
        .run(
            LoopInputs {
                buffer: &buffer,
                mailbox: Some(&mailbox),
                source_finished: &mut finished,
                shutdown: &shutdown,
            },
            &mut |_| {},
        )
        .unwrap();

    assert_eq!(exit, RunExit::StreamEnded);
    assert_eq!(summary.last_seq, 3);
    assert!(summary.frames_processed >= 1);
    assert_eq!(summary.frames_skipped, 0);
}
