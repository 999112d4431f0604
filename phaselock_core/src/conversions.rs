//! `From` implementations bridging `phaselock_config` types to `phaselock_core` types.
//!
//! Degrees and milliseconds from the TOML schema become radians and `Duration`s here.

use std::time::Duration;

use crate::config::{ActuatorCfg, CorrectorCfg, EstimatorCfg, LoopCfg, ReferenceMode};
use crate::model::FitParameters;
use crate::spectrum::WavelengthRange;

// ── EstimatorCfg ─────────────────────────────────────────────────────────────

impl From<&phaselock_config::FitCfg> for EstimatorCfg {
    fn from(c: &phaselock_config::FitCfg) -> Self {
        Self {
            initial: FitParameters {
                carrier_wavelength_nm: c.carrier_wavelength_nm,
                start_wavelength_nm: c.start_wavelength_nm,
                bandwidth_nm: c.bandwidth_nm,
                baseline: c.baseline,
                amplitude: c.amplitude,
                acceleration: c.acceleration,
                phase_rad: c.phase_deg.to_radians(),
            },
            max_evaluations: c.max_evaluations,
            seed_linear: c.seed_linear,
        }
    }
}

// ── CorrectorCfg ─────────────────────────────────────────────────────────────

impl From<&phaselock_config::CorrectorCfg> for CorrectorCfg {
    fn from(c: &phaselock_config::CorrectorCfg) -> Self {
        let reference = match c.reference {
            phaselock_config::ReferenceKind::Absolute => {
                ReferenceMode::Absolute(c.reference_phase_deg.to_radians())
            }
            phaselock_config::ReferenceKind::First => ReferenceMode::FirstPhase,
        };
        Self {
            dead_band_rad: c.dead_band_deg.to_radians(),
            gain: c.gain,
            invert_sign: c.invert,
            reference,
        }
    }
}

// ── ActuatorCfg ──────────────────────────────────────────────────────────────

impl From<&phaselock_config::StageCfg> for ActuatorCfg {
    fn from(c: &phaselock_config::StageCfg) -> Self {
        Self {
            range_deg: c.range_deg,
            recovery_deg: c.recovery_deg,
            max_step_deg: c.max_step_deg,
            settle: Duration::from_millis(c.settle_ms),
            home_settle: Duration::from_millis(c.home_settle_ms),
        }
    }
}

// ── WavelengthRange ──────────────────────────────────────────────────────────

impl From<&phaselock_config::AnalysisCfg> for WavelengthRange {
    fn from(c: &phaselock_config::AnalysisCfg) -> Self {
        Self::new(c.wavelength_min_nm, c.wavelength_max_nm)
    }
}

// ── LoopCfg ──────────────────────────────────────────────────────────────────

impl From<&phaselock_config::RunnerCfg> for LoopCfg {
    fn from(c: &phaselock_config::RunnerCfg) -> Self {
        Self {
            poll: Duration::from_millis(c.poll_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_agree_across_crates() {
        let est = EstimatorCfg::from(&phaselock_config::FitCfg::default());
        assert_eq!(est, EstimatorCfg::default());
        let cor = CorrectorCfg::from(&phaselock_config::CorrectorCfg::default());
        assert_eq!(cor, CorrectorCfg::default());
        let act = ActuatorCfg::from(&phaselock_config::StageCfg::default());
        assert_eq!(act, ActuatorCfg::default());
        let lp = LoopCfg::from(&phaselock_config::RunnerCfg::default());
        assert_eq!(lp, LoopCfg::default());
    }

    #[test]
    fn first_reference_maps_to_first_phase() {
        let c = phaselock_config::CorrectorCfg {
            reference: phaselock_config::ReferenceKind::First,
            ..phaselock_config::CorrectorCfg::default()
        };
        assert_eq!(CorrectorCfg::from(&c).reference, ReferenceMode::FirstPhase);
    }
}
