//! Phase error → stage rotation.
use crate::config::{CorrectorCfg, ReferenceMode};
use std::f64::consts::{FRAC_PI_2, PI};

/// Wrap `phase` into [−π/2, π/2).
///
/// The fitted model is π-periodic, so phases one period apart are the same lock point.
#[inline]
pub fn wrap_half_period(phase: f64) -> f64 {
    let mut m = (phase + FRAC_PI_2).rem_euclid(PI);
    // rem_euclid can round up to exactly π for tiny negative inputs.
    if m >= PI {
        m = 0.0;
    }
    m - FRAC_PI_2
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Fitted phase wrapped into [−π/2, π/2).
    pub wrapped_rad: f64,
    pub reference_rad: f64,
    /// `wrapped_rad − reference_rad`, in (−π, π).
    pub error_rad: f64,
    /// Requested stage rotation; exactly 0 inside the dead band.
    pub delta_deg: f64,
}

impl Correction {
    pub fn in_dead_band(&self) -> bool {
        self.delta_deg == 0.0
    }
}

#[derive(Debug)]
pub struct PhaseCorrector {
    cfg: CorrectorCfg,
    reference: Option<f64>,
}

impl PhaseCorrector {
    pub fn new(cfg: CorrectorCfg) -> Self {
        let mut c = Self {
            cfg,
            reference: None,
        };
        c.reset();
        c
    }

    pub fn reference(&self) -> Option<f64> {
        self.reference
    }

    /// Drop a captured first-phase reference; an absolute one is restored.
    pub fn reset(&mut self) {
        self.reference = match self.cfg.reference {
            ReferenceMode::Absolute(r) => Some(wrap_half_period(r)),
            ReferenceMode::FirstPhase => None,
        };
    }

    /// Map a phase error (radians) to a stage rotation (degrees).
    pub fn correction_for_error(&self, error_rad: f64) -> f64 {
        if error_rad.abs() <= self.cfg.dead_band_rad {
            return 0.0;
        }
        let signed_gain = if self.cfg.invert_sign {
            -self.cfg.gain
        } else {
            self.cfg.gain
        };
        signed_gain * error_rad.to_degrees()
    }

    pub fn update(&mut self, phase_rad: f64) -> Correction {
        let wrapped_rad = wrap_half_period(phase_rad);
        let reference_rad = *self.reference.get_or_insert(wrapped_rad);
        let error_rad = wrapped_rad - reference_rad;
        let delta_deg = self.correction_for_error(error_rad);
        Correction {
            wrapped_rad,
            reference_rad,
            error_rad,
            delta_deg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(FRAC_PI_2, -FRAC_PI_2)]
    #[case(-FRAC_PI_2, -FRAC_PI_2)]
    #[case(PI, 0.0)]
    #[case(1.0 + PI, 1.0)]
    #[case(-1.0 - 2.0 * PI, -1.0)]
    fn wraps_into_half_open_interval(#[case] input: f64, #[case] expected: f64) {
        assert!((wrap_half_period(input) - expected).abs() < 1e-12);
    }

    #[test]
    fn dead_band_edge_is_zero() {
        let c = PhaseCorrector::new(CorrectorCfg::default());
        assert_eq!(c.correction_for_error(10f64.to_radians()), 0.0);
        assert_eq!(c.correction_for_error(-10f64.to_radians()), 0.0);
        assert_eq!(c.correction_for_error(0.0), 0.0);
    }

    #[test]
    fn gain_and_inversion() {
        let c = PhaseCorrector::new(CorrectorCfg::default());
        assert!((c.correction_for_error(20f64.to_radians()) + 5.0).abs() < 1e-12);
        let plain = PhaseCorrector::new(CorrectorCfg {
            invert_sign: false,
            ..CorrectorCfg::default()
        });
        assert!((plain.correction_for_error(20f64.to_radians()) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn first_phase_reference_is_captured_once() {
        let mut c = PhaseCorrector::new(CorrectorCfg {
            reference: ReferenceMode::FirstPhase,
            ..CorrectorCfg::default()
        });
        assert_eq!(c.reference(), None);
        let first = c.update(0.4);
        assert_eq!(first.delta_deg, 0.0);
        assert!((c.reference().unwrap() - 0.4).abs() < 1e-12);
        let later = c.update(0.4 + 30f64.to_radians());
        assert!((later.delta_deg + 7.5).abs() < 1e-9);
        c.reset();
        assert_eq!(c.reference(), None);
    }

    #[test]
    fn error_is_not_rewrapped() {
        // Both sides are wrapped already; their difference can span a full period.
        let mut c = PhaseCorrector::new(CorrectorCfg {
            reference: ReferenceMode::Absolute(60f64.to_radians()),
            ..CorrectorCfg::default()
        });
        let out = c.update((-60f64).to_radians());
        assert!((out.error_rad.to_degrees() + 120.0).abs() < 1e-9);
        assert!((out.delta_deg - 30.0).abs() < 1e-9);
    }
}
