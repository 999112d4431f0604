//! Synthetic spectra for self-checks, tests and benches.
use crate::model::{FitParameters, Projection};

/// Evenly spaced wavelength axis.
pub fn uniform_axis(start_nm: f64, step_nm: f64, len: usize) -> Vec<f64> {
    (0..len).map(|i| start_nm + step_nm * i as f64).collect()
}

/// Detector counts for an ideal, noise-free spectrometer: `peak_counts` times
/// the projection model, rounded and clamped to the `u32` range.
pub fn synthetic_counts(axis_nm: &[f64], params: &FitParameters, peak_counts: f64) -> Vec<u32> {
    axis_nm
        .iter()
        .map(|&w| {
            let v = (peak_counts * Projection.eval(w, params)).round();
            v.clamp(0.0, f64::from(u32::MAX)) as u32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_is_evenly_spaced() {
        assert_eq!(uniform_axis(780.0, 0.5, 3), vec![780.0, 780.5, 781.0]);
        assert!(uniform_axis(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn counts_peak_at_carrier() {
        let p = FitParameters {
            start_wavelength_nm: 800.0,
            ..FitParameters::default()
        };
        let axis = uniform_axis(790.0, 1.0, 21);
        let c = synthetic_counts(&axis, &p, 1000.0);
        assert_eq!(c[10], 1000);
        assert!(c.iter().all(|&v| v <= 1000));
    }
}
