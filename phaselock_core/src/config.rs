//! Runtime configuration for the control loop components.
//!
//! These are the validated, unit-normalized counterparts of the TOML schema in
//! `phaselock_config`; see `conversions` for the mapping.
use crate::error::BuildError;
use crate::model::FitParameters;
use std::f64::consts::{FRAC_PI_2, PI};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorCfg {
    /// Starting guess for the first full fit.
    pub initial: FitParameters,
    pub max_evaluations: usize,
    /// Seed baseline/amplitude from the first spectrum's min/max.
    pub seed_linear: bool,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            initial: FitParameters::default(),
            max_evaluations: 10_000,
            seed_linear: true,
        }
    }
}

/// What the wrapped phase is compared against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceMode {
    /// Fixed reference in radians, within [−π/2, π/2).
    Absolute(f64),
    /// The first wrapped phase seen after start or reset.
    FirstPhase,
}

impl Default for ReferenceMode {
    fn default() -> Self {
        Self::Absolute(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectorCfg {
    pub dead_band_rad: f64,
    /// Stage degrees per degree of phase error.
    pub gain: f64,
    /// Stage motion opposes the phase error.
    pub invert_sign: bool,
    pub reference: ReferenceMode,
}

impl Default for CorrectorCfg {
    fn default() -> Self {
        Self {
            dead_band_rad: 10f64.to_radians(),
            gain: 0.25,
            invert_sign: true,
            reference: ReferenceMode::default(),
        }
    }
}

impl CorrectorCfg {
    pub fn validate(&self) -> Result<(), BuildError> {
        if !(0.0..FRAC_PI_2).contains(&self.dead_band_rad) {
            return Err(BuildError::InvalidConfig("dead band must be in [0, 90°)"));
        }
        if !(self.gain.is_finite() && self.gain > 0.0) {
            return Err(BuildError::InvalidConfig("corrector gain must be > 0"));
        }
        if let ReferenceMode::Absolute(r) = self.reference
            && !(-FRAC_PI_2..FRAC_PI_2).contains(&r)
        {
            return Err(BuildError::InvalidConfig(
                "reference phase must be in [-90°, 90°)",
            ));
        }
        Ok(())
    }

    /// Upper bound of |wrapped − reference|: both sides lie in [−π/2, π/2).
    pub fn max_error_rad(&self) -> f64 {
        match self.reference {
            ReferenceMode::Absolute(r) => FRAC_PI_2 + r.abs(),
            ReferenceMode::FirstPhase => PI,
        }
    }

    /// Largest rotation `PhaseCorrector` can request, in stage degrees.
    pub fn max_delta_deg(&self) -> f64 {
        self.gain * self.max_error_rad().to_degrees()
    }

    /// Every correction must fit in one accepted actuator step.
    pub fn check_fits(&self, actuator: &ActuatorCfg) -> Result<(), BuildError> {
        if self.max_delta_deg() > actuator.max_step_deg {
            return Err(BuildError::InvalidConfig(
                "corrector gain can request moves above the actuator max step",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCfg {
    /// Tracked position stays within ±range_deg.
    pub range_deg: f64,
    /// Magnitude of the rotation applied before a move would leave the range.
    pub recovery_deg: f64,
    /// Largest single requested move.
    pub max_step_deg: f64,
    pub settle: Duration,
    pub home_settle: Duration,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            range_deg: 90.0,
            recovery_deg: 90.0,
            max_step_deg: 90.0,
            settle: Duration::from_secs(2),
            home_settle: Duration::from_secs(1),
        }
    }
}

impl ActuatorCfg {
    /// `0 < max_step ≤ recovery ≤ range` guarantees one recovery always lands in range.
    pub fn validate(&self) -> Result<(), BuildError> {
        if !(self.range_deg.is_finite() && self.range_deg > 0.0) {
            return Err(BuildError::InvalidConfig("actuator range must be > 0"));
        }
        if !(self.max_step_deg > 0.0 && self.max_step_deg <= self.recovery_deg) {
            return Err(BuildError::InvalidConfig(
                "max step must be in (0, recovery]",
            ));
        }
        if self.recovery_deg > self.range_deg {
            return Err(BuildError::InvalidConfig("recovery must be <= range"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopCfg {
    /// Sleep when no new frame is available.
    pub poll: Duration,
}

impl Default for LoopCfg {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(10),
        }
    }
}
