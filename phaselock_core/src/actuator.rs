//! Relative rotation commands with position tracking and range safety.
//!
//! The driver is the only owner of the stage. It keeps the cumulative rotation
//! since the last home and never lets an accepted command push it outside
//! ±`range_deg`: a move that would is preceded by a fixed recovery rotation
//! back toward zero.
use crate::config::ActuatorCfg;
use crate::error::{ActuatorError, BuildError};
use crate::hw_error::map_hw_error;
use phaselock_traits::{Clock, Stage};
use std::sync::Arc;

/// What a `rotate` call actually did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotateOutcome {
    /// Recovery rotation issued before the requested delta, if any.
    pub recovery_deg: Option<f64>,
    /// Tracked position after the call.
    pub position_deg: f64,
    /// Hardware moves issued (0 for a zero delta).
    pub moves: u8,
}

pub struct ActuatorDriver<S> {
    stage: S,
    cfg: ActuatorCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    position_deg: f64,
    faulted: bool,
}

impl<S> std::fmt::Debug for ActuatorDriver<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuatorDriver")
            .field("cfg", &self.cfg)
            .field("position_deg", &self.position_deg)
            .field("faulted", &self.faulted)
            .finish_non_exhaustive()
    }
}

impl<S: Stage> ActuatorDriver<S> {
    /// Wrap a stage that is assumed to sit at the reference position.
    pub fn new(
        stage: S,
        cfg: ActuatorCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, BuildError> {
        cfg.validate()?;
        Ok(Self {
            stage,
            cfg,
            clock,
            position_deg: 0.0,
            faulted: false,
        })
    }

    /// Cumulative rotation since the last home, in degrees.
    pub fn position(&self) -> f64 {
        self.position_deg
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub fn config(&self) -> &ActuatorCfg {
        &self.cfg
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Rotate by `delta_deg`, inserting a recovery move when the target would
    /// leave the safety range.
    pub fn rotate(&mut self, delta_deg: f64) -> Result<RotateOutcome, ActuatorError> {
        if delta_deg == 0.0 {
            return Ok(RotateOutcome {
                recovery_deg: None,
                position_deg: self.position_deg,
                moves: 0,
            });
        }
        if !delta_deg.is_finite() {
            return Err(ActuatorError::InvalidDelta(delta_deg));
        }
        if self.faulted {
            return Err(ActuatorError::Faulted);
        }
        if delta_deg.abs() > self.cfg.max_step_deg {
            return Err(ActuatorError::StepTooLarge {
                requested: delta_deg,
                max: self.cfg.max_step_deg,
            });
        }

        let target = self.position_deg + delta_deg;
        let recovery = if target > self.cfg.range_deg {
            Some(-self.cfg.recovery_deg)
        } else if target < -self.cfg.range_deg {
            Some(self.cfg.recovery_deg)
        } else {
            None
        };

        let mut moves = 0;
        if let Some(r) = recovery {
            tracing::info!(
                position_deg = self.position_deg,
                requested_deg = delta_deg,
                recovery_deg = r,
                "range limit reached; recovering"
            );
            self.issue(r)?;
            moves += 1;
        }
        self.issue(delta_deg)?;
        moves += 1;

        Ok(RotateOutcome {
            recovery_deg: recovery,
            position_deg: self.position_deg,
            moves,
        })
    }

    /// Home the stage; the only way to reset position and clear a fault.
    pub fn home(&mut self) -> Result<(), ActuatorError> {
        tracing::info!(position_deg = self.position_deg, "homing stage");
        if let Err(e) = self.stage.home() {
            self.faulted = true;
            let err = map_hw_error(&*e);
            tracing::error!(error = %err, "homing failed");
            return Err(err);
        }
        self.clock.sleep(self.cfg.home_settle);
        self.position_deg = 0.0;
        self.faulted = false;
        Ok(())
    }

    fn issue(&mut self, deg: f64) -> Result<(), ActuatorError> {
        if let Err(e) = self.stage.move_relative(deg) {
            self.faulted = true;
            let err = map_hw_error(&*e);
            tracing::error!(error = %err, move_deg = deg, "stage move failed");
            return Err(err);
        }
        self.position_deg += deg;
        tracing::debug!(move_deg = deg, position_deg = self.position_deg, "stage moved");
        self.clock.sleep(self.cfg.settle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{RecordingStage, StageCall};
    use phaselock_traits::clock::test_clock::TestClock;
    use std::time::Duration;

    fn driver(stage: RecordingStage) -> (ActuatorDriver<RecordingStage>, TestClock) {
        let clock = TestClock::new();
        let d =
            ActuatorDriver::new(stage, ActuatorCfg::default(), Arc::new(clock.clone())).unwrap();
        (d, clock)
    }

    #[test]
    fn zero_delta_is_a_noop() {
        let stage = RecordingStage::new();
        let (mut d, clock) = driver(stage.clone());
        let out = d.rotate(0.0).unwrap();
        assert_eq!(out.moves, 0);
        assert!(stage.calls().is_empty());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn in_range_move_settles_and_tracks() {
        let stage = RecordingStage::new();
        let (mut d, clock) = driver(stage.clone());
        d.rotate(12.5).unwrap();
        d.rotate(-2.5).unwrap();
        assert_eq!(d.position(), 10.0);
        assert_eq!(stage.calls(), vec![StageCall::Move(12.5), StageCall::Move(-2.5)]);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[test]
    fn recovers_before_leaving_upper_bound() {
        let stage = RecordingStage::new();
        let (mut d, _) = driver(stage.clone());
        d.rotate(85.0).unwrap();
        let out = d.rotate(10.0).unwrap();
        assert_eq!(out.recovery_deg, Some(-90.0));
        assert_eq!(out.moves, 2);
        assert_eq!(d.position(), 5.0);
        assert_eq!(
            stage.calls(),
            vec![
                StageCall::Move(85.0),
                StageCall::Move(-90.0),
                StageCall::Move(10.0)
            ]
        );
    }

    #[test]
    fn recovers_before_leaving_lower_bound() {
        let (mut d, _) = driver(RecordingStage::new());
        d.rotate(-80.0).unwrap();
        let out = d.rotate(-20.0).unwrap();
        assert_eq!(out.recovery_deg, Some(90.0));
        assert_eq!(d.position(), -10.0);
    }

    #[test]
    fn oversized_step_is_refused_without_motion() {
        let stage = RecordingStage::new();
        let (mut d, _) = driver(stage.clone());
        let err = d.rotate(120.0).unwrap_err();
        assert!(matches!(err, ActuatorError::StepTooLarge { .. }));
        assert!(stage.calls().is_empty());
        assert!(matches!(
            d.rotate(f64::NAN).unwrap_err(),
            ActuatorError::InvalidDelta(_)
        ));
    }

    #[test]
    fn hardware_failure_latches_until_home() {
        let stage = RecordingStage::new();
        stage.fail_next_move("motor stalled");
        let (mut d, _) = driver(stage.clone());
        let err = d.rotate(5.0).unwrap_err();
        assert_eq!(err, ActuatorError::Hardware("motor stalled".into()));
        assert!(d.is_faulted());
        assert_eq!(d.position(), 0.0);
        assert_eq!(d.rotate(5.0).unwrap_err(), ActuatorError::Faulted);

        d.home().unwrap();
        assert!(!d.is_faulted());
        d.rotate(5.0).unwrap();
        assert_eq!(d.position(), 5.0);
    }

    #[test]
    fn home_resets_position_after_settle() {
        let stage = RecordingStage::new();
        let (mut d, clock) = driver(stage.clone());
        d.rotate(30.0).unwrap();
        let before = clock.elapsed();
        d.home().unwrap();
        assert_eq!(d.position(), 0.0);
        assert_eq!(clock.elapsed() - before, Duration::from_secs(1));
        assert_eq!(stage.calls().last(), Some(&StageCall::Home));
    }
}
