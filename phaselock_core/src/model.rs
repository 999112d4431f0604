//! Analytic projection of a chirped, Gaussian-enveloped interference spectrum.
//!
//! ```text
//! f(λ) = B + A · exp(−4 ln2 · (λ − λc)² / w²) · cos²(φ + ½ · a · (λ − λs)²)
//! ```
//!
//! The model is π-periodic in φ. Parameters are kept in a fixed order so the
//! solver can address them by index.
use std::f64::consts::LN_2;

pub const PARAM_COUNT: usize = 7;

const FOUR_LN2: f64 = 4.0 * LN_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamName {
    CarrierWavelength,
    StartWavelength,
    Bandwidth,
    Baseline,
    Amplitude,
    Acceleration,
    Phase,
}

impl ParamName {
    pub const ALL: [Self; PARAM_COUNT] = [
        Self::CarrierWavelength,
        Self::StartWavelength,
        Self::Bandwidth,
        Self::Baseline,
        Self::Amplitude,
        Self::Acceleration,
        Self::Phase,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CarrierWavelength => "carrier_wavelength",
            Self::StartWavelength => "start_wavelength",
            Self::Bandwidth => "bandwidth",
            Self::Baseline => "baseline",
            Self::Amplitude => "amplitude",
            Self::Acceleration => "acceleration",
            Self::Phase => "phase",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Self::CarrierWavelength | Self::StartWavelength | Self::Bandwidth => "nm",
            Self::Baseline | Self::Amplitude => "1",
            Self::Acceleration => "rad/nm²",
            Self::Phase => "rad",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParameters {
    pub carrier_wavelength_nm: f64,
    pub start_wavelength_nm: f64,
    /// Envelope FWHM.
    pub bandwidth_nm: f64,
    pub baseline: f64,
    pub amplitude: f64,
    pub acceleration: f64,
    pub phase_rad: f64,
}

impl Default for FitParameters {
    fn default() -> Self {
        Self {
            carrier_wavelength_nm: 800.0,
            start_wavelength_nm: 790.0,
            bandwidth_nm: 12.0,
            baseline: 0.0,
            amplitude: 1.0,
            acceleration: 0.05,
            phase_rad: 0.0,
        }
    }
}

impl FitParameters {
    pub fn get(&self, name: ParamName) -> f64 {
        self.to_array()[name.index()]
    }

    pub fn set(&mut self, name: ParamName, value: f64) {
        let mut a = self.to_array();
        a[name.index()] = value;
        *self = Self::from_array(a);
    }

    pub fn to_array(&self) -> [f64; PARAM_COUNT] {
        [
            self.carrier_wavelength_nm,
            self.start_wavelength_nm,
            self.bandwidth_nm,
            self.baseline,
            self.amplitude,
            self.acceleration,
            self.phase_rad,
        ]
    }

    pub fn from_array(a: [f64; PARAM_COUNT]) -> Self {
        Self {
            carrier_wavelength_nm: a[0],
            start_wavelength_nm: a[1],
            bandwidth_nm: a[2],
            baseline: a[3],
            amplitude: a[4],
            acceleration: a[5],
            phase_rad: a[6],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// A curve `y = f(x; p)` with an analytic gradient in `p`.
pub trait CurveModel {
    fn param_count(&self) -> usize;

    /// Value at `x`.
    fn value(&self, x: f64, params: &[f64]) -> f64;

    /// Value at `x`; writes ∂f/∂pᵢ into `grad`.
    fn value_and_gradient(&self, x: f64, params: &[f64], grad: &mut [f64]) -> f64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Projection;

impl Projection {
    pub fn eval(&self, wavelength_nm: f64, p: &FitParameters) -> f64 {
        self.value(wavelength_nm, &p.to_array())
    }
}

impl CurveModel for Projection {
    fn param_count(&self) -> usize {
        PARAM_COUNT
    }

    fn value(&self, x: f64, p: &[f64]) -> f64 {
        let (lc, ls, bw, b, a, acc, phi) = (p[0], p[1], p[2], p[3], p[4], p[5], p[6]);
        let d = x - lc;
        let env = (-FOUR_LN2 * d * d / (bw * bw)).exp();
        let s = x - ls;
        let c = (phi + 0.5 * acc * s * s).cos();
        b + a * env * c * c
    }

    fn value_and_gradient(&self, x: f64, p: &[f64], grad: &mut [f64]) -> f64 {
        let (lc, ls, bw, b, a, acc, phi) = (p[0], p[1], p[2], p[3], p[4], p[5], p[6]);
        let d = x - lc;
        let bw2 = bw * bw;
        let env = (-FOUR_LN2 * d * d / bw2).exp();
        let s = x - ls;
        let theta = phi + 0.5 * acc * s * s;
        let (sin_t, cos_t) = theta.sin_cos();
        let cos2 = cos_t * cos_t;
        let sin2t = 2.0 * sin_t * cos_t;
        let a_env = a * env;

        grad[0] = a_env * cos2 * 2.0 * FOUR_LN2 * d / bw2;
        grad[1] = a_env * sin2t * acc * s;
        grad[2] = a_env * cos2 * 2.0 * FOUR_LN2 * d * d / (bw2 * bw);
        grad[3] = 1.0;
        grad[4] = env * cos2;
        grad[5] = -a_env * sin2t * 0.5 * s * s;
        grad[6] = -a_env * sin2t;

        b + a_env * cos2
    }
}
