//! Type-state builder for [`PhaseLock`].
//!
//! The builder enforces at compile time that a stage and a wavelength axis are
//! provided before `build()` is available. `try_build()` is always available
//! for dynamic checks.
use std::marker::PhantomData;
use std::sync::Arc;

use phaselock_traits::{Clock, MonotonicClock, Stage};

use crate::actuator::ActuatorDriver;
use crate::config::{ActuatorCfg, CorrectorCfg, EstimatorCfg, LoopCfg};
use crate::corrector::PhaseCorrector;
use crate::error::{BuildError, Result};
use crate::estimator::PhaseEstimator;
use crate::runner::PhaseLock;
use crate::spectrum::WavelengthRange;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `PhaseLock`. All fields are validated on `build()`.
pub struct PhaseLockBuilder<S, W> {
    stage: Option<Box<dyn Stage + Send>>,
    wavelengths: Option<Vec<f64>>,
    range: Option<WavelengthRange>,
    estimator: Option<EstimatorCfg>,
    corrector: Option<CorrectorCfg>,
    actuator: Option<ActuatorCfg>,
    loop_cfg: Option<LoopCfg>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
    _w: PhantomData<W>,
}

impl Default for PhaseLockBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            stage: None,
            wavelengths: None,
            range: None,
            estimator: None,
            corrector: None,
            actuator: None,
            loop_cfg: None,
            clock: None,
            _s: PhantomData,
            _w: PhantomData,
        }
    }
}

/// Validate configuration and assemble the loop.
#[allow(clippy::too_many_arguments)]
fn validate_and_build(
    stage: Box<dyn Stage + Send>,
    axis: Vec<f64>,
    range: Option<WavelengthRange>,
    estimator: EstimatorCfg,
    corrector: CorrectorCfg,
    actuator: ActuatorCfg,
    loop_cfg: LoopCfg,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
) -> Result<PhaseLock> {
    if axis.is_empty() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "wavelength axis must not be empty",
        )));
    }
    if axis.iter().any(|w| !w.is_finite()) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "wavelength axis must be finite",
        )));
    }
    // Without an explicit window, fit the whole axis.
    let range = match range {
        Some(r) => r,
        None => {
            let (lo, hi) = axis
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &w| {
                    (lo.min(w), hi.max(w))
                });
            WavelengthRange::new(lo, hi)
        }
    };
    if !(range.min_nm.is_finite() && range.max_nm.is_finite() && range.min_nm <= range.max_nm) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "wavelength range must be finite with min <= max",
        )));
    }
    if !axis.iter().any(|&w| range.contains(w)) {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "wavelength range does not overlap the axis",
        )));
    }
    if estimator.max_evaluations == 0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "max_evaluations must be >= 1",
        )));
    }
    if !estimator.initial.is_finite() || estimator.initial.bandwidth_nm <= 0.0 {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "initial fit parameters must be finite with bandwidth > 0",
        )));
    }
    if loop_cfg.poll.is_zero() {
        return Err(eyre::Report::new(BuildError::InvalidConfig(
            "poll interval must be > 0",
        )));
    }
    corrector.validate().map_err(eyre::Report::new)?;
    actuator.validate().map_err(eyre::Report::new)?;
    corrector.check_fits(&actuator).map_err(eyre::Report::new)?;

    let clock: Arc<dyn Clock + Send + Sync> = match clock {
        Some(c) => c,
        None => Arc::new(MonotonicClock::new()),
    };
    let actuator =
        ActuatorDriver::new(stage, actuator, clock.clone()).map_err(eyre::Report::new)?;

    Ok(PhaseLock {
        axis,
        range,
        estimator: PhaseEstimator::new(estimator),
        corrector: PhaseCorrector::new(corrector),
        actuator,
        clock,
        loop_cfg,
    })
}

impl<S, W> PhaseLockBuilder<S, W> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<PhaseLock> {
        let stage = self
            .stage
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStage))?;
        let axis = self
            .wavelengths
            .ok_or_else(|| eyre::Report::new(BuildError::MissingWavelengths))?;
        validate_and_build(
            stage,
            axis,
            self.range,
            self.estimator.unwrap_or_default(),
            self.corrector.unwrap_or_default(),
            self.actuator.unwrap_or_default(),
            self.loop_cfg.unwrap_or_default(),
            self.clock,
        )
    }
}

/// Chainable setters that do not affect type-state.
impl<S, W> PhaseLockBuilder<S, W> {
    /// Restrict fitting to this window; defaults to the whole axis.
    pub fn with_range(mut self, range: WavelengthRange) -> Self {
        self.range = Some(range);
        self
    }
    pub fn with_estimator(mut self, estimator: EstimatorCfg) -> Self {
        self.estimator = Some(estimator);
        self
    }
    pub fn with_corrector(mut self, corrector: CorrectorCfg) -> Self {
        self.corrector = Some(corrector);
        self
    }
    pub fn with_actuator(mut self, actuator: ActuatorCfg) -> Self {
        self.actuator = Some(actuator);
        self
    }
    pub fn with_loop(mut self, loop_cfg: LoopCfg) -> Self {
        self.loop_cfg = Some(loop_cfg);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<W> PhaseLockBuilder<Missing, W> {
    pub fn with_stage(self, stage: impl Stage + Send + 'static) -> PhaseLockBuilder<Set, W> {
        PhaseLockBuilder {
            stage: Some(Box::new(stage)),
            wavelengths: self.wavelengths,
            range: self.range,
            estimator: self.estimator,
            corrector: self.corrector,
            actuator: self.actuator,
            loop_cfg: self.loop_cfg,
            clock: self.clock,
            _s: PhantomData,
            _w: PhantomData,
        }
    }
}

impl<S> PhaseLockBuilder<S, Missing> {
    /// Wavelength of every detector pixel, in frame order.
    pub fn with_wavelengths(self, axis: Vec<f64>) -> PhaseLockBuilder<S, Set> {
        PhaseLockBuilder {
            stage: self.stage,
            wavelengths: Some(axis),
            range: self.range,
            estimator: self.estimator,
            corrector: self.corrector,
            actuator: self.actuator,
            loop_cfg: self.loop_cfg,
            clock: self.clock,
            _s: PhantomData,
            _w: PhantomData,
        }
    }
}

impl PhaseLockBuilder<Set, Set> {
    /// Build with all required pieces present.
    pub fn build(self) -> Result<PhaseLock> {
        self.try_build()
    }
}
