//! Phase estimation by warm-started curve fitting.
//!
//! The first spectrum gets a fit of every parameter; once that succeeds the
//! estimator tracks and refits only the phase, holding the rest fixed.
use crate::config::EstimatorCfg;
use crate::error::FitError;
use crate::fit::{FitOptions, FitReport, levenberg_marquardt};
use crate::model::{FitParameters, PARAM_COUNT, ParamName, Projection};
use crate::spectrum::Spectrum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorState {
    Uninitialized,
    Tracking,
}

/// Result of one successful estimator update.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub phase_rad: f64,
    pub params: FitParameters,
    pub full_fit: bool,
    pub iterations: usize,
    pub evaluations: usize,
    pub r_squared: f64,
}

#[derive(Debug, Clone)]
pub struct PhaseEstimator {
    cfg: EstimatorCfg,
    params: FitParameters,
    phase: Option<f64>,
}

impl PhaseEstimator {
    pub fn new(cfg: EstimatorCfg) -> Self {
        Self {
            params: cfg.initial,
            cfg,
            phase: None,
        }
    }

    pub fn state(&self) -> EstimatorState {
        if self.phase.is_some() {
            EstimatorState::Tracking
        } else {
            EstimatorState::Uninitialized
        }
    }

    /// Last fitted phase in radians, `None` until a full fit has succeeded.
    pub fn current_phase(&self) -> Option<f64> {
        self.phase
    }

    /// Best current estimate; the configured guess while uninitialized.
    pub fn parameters(&self) -> &FitParameters {
        &self.params
    }

    /// Forget the lock and start over from the configured guess.
    pub fn reset(&mut self) {
        self.params = self.cfg.initial;
        self.phase = None;
    }

    /// Fit `spectrum` and advance the state. On error nothing changes.
    pub fn update(&mut self, spectrum: &Spectrum) -> Result<Estimate, FitError> {
        let full_fit = self.phase.is_none();
        let (guess, free) = if full_fit {
            let mut guess = self.cfg.initial;
            if self.cfg.seed_linear {
                seed_linear(&mut guess, spectrum.intensity());
            }
            (guess, [true; PARAM_COUNT])
        } else {
            let mut free = [false; PARAM_COUNT];
            free[ParamName::Phase.index()] = true;
            (self.params, free)
        };

        let opts = FitOptions {
            max_evaluations: self.cfg.max_evaluations,
            ..FitOptions::default()
        };
        let report = levenberg_marquardt(
            &Projection,
            spectrum.wavelengths_nm(),
            spectrum.intensity(),
            &guess.to_array(),
            &free,
            &opts,
        )?;
        let params = to_params(&report)?;

        tracing::debug!(
            full_fit,
            phase_rad = params.phase_rad,
            iterations = report.iterations,
            evaluations = report.evaluations,
            r_squared = report.r_squared,
            "fit converged"
        );

        self.params = params;
        self.phase = Some(params.phase_rad);
        Ok(Estimate {
            phase_rad: params.phase_rad,
            params,
            full_fit,
            iterations: report.iterations,
            evaluations: report.evaluations,
            r_squared: report.r_squared,
        })
    }
}

fn to_params(report: &FitReport) -> Result<FitParameters, FitError> {
    let arr: [f64; PARAM_COUNT] = report
        .params
        .as_slice()
        .try_into()
        .map_err(|_| FitError::NonFinite)?;
    let params = FitParameters::from_array(arr);
    if params.is_finite() {
        Ok(params)
    } else {
        Err(FitError::NonFinite)
    }
}

/// Normalized intensities shrink with pixel count, so the configured linear
/// terms are rarely near the data; start them from its range instead.
fn seed_linear(guess: &mut FitParameters, intensity: &[f64]) {
    let (min, max) = intensity
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min.is_finite() && max.is_finite() && max > min {
        guess.baseline = min;
        guess.amplitude = max - min;
    }
}
