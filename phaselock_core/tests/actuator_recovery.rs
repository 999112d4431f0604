//! Range recovery as seen through the full pipeline.
use phaselock_core::mocks::{RecordingStage, StageCall};
use phaselock_core::util::{synthetic_counts, uniform_axis};
use phaselock_core::{
    ActuatorCfg, CorrectorCfg, FitParameters, Frame, PhaseLock, ReferenceMode, StepOutcome,
    WavelengthRange,
};
use phaselock_traits::clock::test_clock::TestClock;
use std::sync::Arc;
use std::time::Duration;

fn applied(outcome: StepOutcome) -> phaselock_core::IterationStatus {
    match outcome {
        StepOutcome::Applied(s) => s,
        StepOutcome::Skipped(r) => panic!("frame skipped: {r:?}"),
    }
}

#[test]
fn recovery_rotation_precedes_out_of_range_move() {
    let axis = uniform_axis(780.0, 0.1, 400);
    let frame = Frame {
        timestamp: "t".into(),
        device_index: 0,
        counts: synthetic_counts(&axis, &FitParameters::default(), 20_000.0),
    };
    let stage = RecordingStage::new();
    let clock = TestClock::new();
    // A phase-0 spectrum sits 30° above this reference: every frame asks for −7.5°.
    let mut pl = PhaseLock::builder()
        .with_stage(stage.clone())
        .with_wavelengths(axis)
        .with_range(WavelengthRange::new(780.0, 820.0))
        .with_corrector(CorrectorCfg {
            reference: ReferenceMode::Absolute((-30f64).to_radians()),
            ..CorrectorCfg::default()
        })
        .with_actuator(ActuatorCfg {
            // Smallest limit that fits 0.25 × (90° + 30°).
            range_deg: 32.0,
            recovery_deg: 32.0,
            max_step_deg: 32.0,
            settle: Duration::from_millis(5),
            home_settle: Duration::ZERO,
        })
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    for seq in 1..=4 {
        let s = applied(pl.step(seq, &frame).unwrap());
        assert!((s.delta_deg + 7.5).abs() < 0.05, "{s:?}");
        assert_eq!(s.recovery_deg, None);
    }
    assert!((pl.position() + 30.0).abs() < 0.2);

    let fifth = applied(pl.step(5, &frame).unwrap());
    assert_eq!(fifth.recovery_deg, Some(32.0));
    assert!(fifth.position_deg.abs() <= 32.0);

    let calls = stage.calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[4], StageCall::Move(32.0));
    assert!(matches!(calls[5], StageCall::Move(d) if (d + 7.5).abs() < 0.05));
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(5); 6]);

    for seq in 6..40 {
        let s = applied(pl.step(seq, &frame).unwrap());
        assert!(s.position_deg.abs() <= 32.0, "{s:?}");
    }
}
