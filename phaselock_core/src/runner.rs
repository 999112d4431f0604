//! The closed loop: frame → spectrum → fit → correction → stage.
use crate::actuator::ActuatorDriver;
use crate::buffer::FrameBuffer;
use crate::config::LoopCfg;
use crate::corrector::PhaseCorrector;
use crate::error::{ActuatorError, FitError, PhaseLockError, SpectrumError};
use crate::estimator::PhaseEstimator;
use crate::mailbox::ConfigMailbox;
use crate::spectrum::{Spectrum, WavelengthRange};
use crate::stream::{AcquisitionConfig, Frame};
use phaselock_traits::{Clock, Stage};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-iteration telemetry handed to the observer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationStatus {
    pub seq: u64,
    pub timestamp: String,
    pub phase_rad: f64,
    pub wrapped_deg: f64,
    pub reference_deg: f64,
    pub error_deg: f64,
    pub delta_deg: f64,
    pub recovery_deg: Option<f64>,
    pub position_deg: f64,
    pub full_fit: bool,
    pub evaluations: usize,
    pub r_squared: f64,
}

/// Why an iteration did nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Spectrum(SpectrumError),
    Fit(FitError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Applied(IterationStatus),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    StreamEnded,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub corrections: u64,
    pub recoveries: u64,
    pub last_seq: u64,
}

/// Shared inputs of [`PhaseLock::run`].
pub struct LoopInputs<'a> {
    pub buffer: &'a FrameBuffer,
    pub mailbox: Option<&'a ConfigMailbox<AcquisitionConfig>>,
    /// True once no further frames can arrive.
    pub source_finished: &'a mut dyn FnMut() -> bool,
    pub shutdown: &'a AtomicBool,
}

pub struct PhaseLock {
    pub(crate) axis: Vec<f64>,
    pub(crate) range: WavelengthRange,
    pub(crate) estimator: PhaseEstimator,
    pub(crate) corrector: PhaseCorrector,
    pub(crate) actuator: ActuatorDriver<Box<dyn Stage + Send>>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) loop_cfg: LoopCfg,
}

impl std::fmt::Debug for PhaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseLock")
            .field("pixels", &self.axis.len())
            .field("range", &self.range)
            .field("phase", &self.estimator.current_phase())
            .field("position_deg", &self.actuator.position())
            .finish_non_exhaustive()
    }
}

impl PhaseLock {
    pub fn builder() -> crate::builder::PhaseLockBuilder<
        crate::builder::Missing,
        crate::builder::Missing,
    > {
        crate::builder::PhaseLockBuilder::default()
    }

    pub fn position(&self) -> f64 {
        self.actuator.position()
    }

    pub fn current_phase(&self) -> Option<f64> {
        self.estimator.current_phase()
    }

    pub fn estimator(&self) -> &PhaseEstimator {
        &self.estimator
    }

    pub fn axis(&self) -> &[f64] {
        &self.axis
    }

    pub fn home(&mut self) -> Result<(), ActuatorError> {
        self.actuator.home()
    }

    /// Start over: forget the fitted state and any captured reference.
    pub fn reset(&mut self) {
        self.estimator.reset();
        self.corrector.reset();
    }

    /// One pass of the pipeline for `frame`.
    ///
    /// Data and fit problems skip the frame; only actuator faults are errors.
    pub fn step(&mut self, seq: u64, frame: &Frame) -> Result<StepOutcome, ActuatorError> {
        let spectrum = match Spectrum::from_raw_data(&self.axis, &frame.counts) {
            Ok(s) => s.cut(&self.range),
            Err(e) => {
                tracing::warn!(seq, error = %e, "frame dropped");
                return Ok(StepOutcome::Skipped(SkipReason::Spectrum(e)));
            }
        };
        let estimate = match self.estimator.update(&spectrum) {
            Ok(est) => est,
            Err(e) => {
                tracing::warn!(seq, error = %e, points = spectrum.len(), "fit failed");
                return Ok(StepOutcome::Skipped(SkipReason::Fit(e)));
            }
        };
        let correction = self.corrector.update(estimate.phase_rad);
        let outcome = self.actuator.rotate(correction.delta_deg)?;

        if !correction.in_dead_band() {
            tracing::info!(
                seq,
                error_deg = correction.error_rad.to_degrees(),
                delta_deg = correction.delta_deg,
                position_deg = outcome.position_deg,
                "correction applied"
            );
        }

        Ok(StepOutcome::Applied(IterationStatus {
            seq,
            timestamp: frame.timestamp.clone(),
            phase_rad: estimate.phase_rad,
            wrapped_deg: correction.wrapped_rad.to_degrees(),
            reference_deg: correction.reference_rad.to_degrees(),
            error_deg: correction.error_rad.to_degrees(),
            delta_deg: correction.delta_deg,
            recovery_deg: outcome.recovery_deg,
            position_deg: outcome.position_deg,
            full_fit: estimate.full_fit,
            evaluations: estimate.evaluations,
            r_squared: estimate.r_squared,
        }))
    }

    /// Poll the buffer until the source finishes or shutdown is requested.
    ///
    /// Shutdown is checked once per iteration, never during a move. The last
    /// buffered frame is always processed before a finished source ends the run.
    pub fn run(
        &mut self,
        io: LoopInputs<'_>,
        observer: &mut dyn FnMut(&IterationStatus),
    ) -> Result<(RunExit, RunSummary), PhaseLockError> {
        let mut summary = RunSummary::default();
        tracing::info!(
            pixels = self.axis.len(),
            min_nm = self.range.min_nm,
            max_nm = self.range.max_nm,
            "phase lock start"
        );

        let exit = loop {
            if io.shutdown.load(Ordering::Relaxed) {
                break RunExit::Shutdown;
            }
            if let Some(cfg) = io.mailbox.and_then(ConfigMailbox::get_if_updated) {
                tracing::info!(
                    exposure_ms = cfg.exposure_ms,
                    average = cfg.average,
                    dark_subtraction = cfg.dark_subtraction,
                    "acquisition settings changed"
                );
            }

            let Some((seq, frame)) = io.buffer.get_newer(summary.last_seq) else {
                if (io.source_finished)() && io.buffer.sequence() == summary.last_seq {
                    break RunExit::StreamEnded;
                }
                self.clock.sleep(self.loop_cfg.poll);
                continue;
            };
            summary.last_seq = seq;

            match self.step(seq, &frame) {
                Ok(StepOutcome::Applied(status)) => {
                    summary.frames_processed += 1;
                    if status.delta_deg != 0.0 {
                        summary.corrections += 1;
                    }
                    if status.recovery_deg.is_some() {
                        summary.recoveries += 1;
                    }
                    observer(&status);
                }
                Ok(StepOutcome::Skipped(_)) => summary.frames_skipped += 1,
                Err(e) => {
                    tracing::error!(error = %e, seq, "actuator fault; stopping");
                    return Err(e.into());
                }
            }
        };

        tracing::info!(
            ?exit,
            processed = summary.frames_processed,
            skipped = summary.frames_skipped,
            corrections = summary.corrections,
            "phase lock stopped"
        );
        Ok((exit, summary))
    }
}
