//! Normalized intensity spectra and the wavelength axis they live on.
use crate::error::SpectrumError;
use crate::stream::StreamMeta;

/// Inclusive wavelength window in nanometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthRange {
    pub min_nm: f64,
    pub max_nm: f64,
}

impl WavelengthRange {
    pub fn new(min_nm: f64, max_nm: f64) -> Self {
        Self { min_nm, max_nm }
    }

    #[inline]
    pub fn contains(&self, wavelength_nm: f64) -> bool {
        (self.min_nm..=self.max_nm).contains(&wavelength_nm)
    }
}

/// Intensity over wavelength, normalized so the acquired counts sum to 1.
///
/// Immutable once built; [`Spectrum::cut`] returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    wavelengths_nm: Vec<f64>,
    intensity: Vec<f64>,
}

impl Spectrum {
    /// Normalize raw detector counts by their total.
    pub fn from_raw_data(wavelengths_nm: &[f64], counts: &[u32]) -> Result<Self, SpectrumError> {
        if wavelengths_nm.len() != counts.len() {
            return Err(SpectrumError::LengthMismatch {
                wavelengths: wavelengths_nm.len(),
                counts: counts.len(),
            });
        }
        if wavelengths_nm.iter().any(|w| !w.is_finite()) {
            return Err(SpectrumError::NonFinite);
        }
        let total: u64 = counts.iter().map(|&c| u64::from(c)).sum();
        if total == 0 {
            return Err(SpectrumError::ZeroCounts);
        }
        let total = total as f64;
        Ok(Self {
            wavelengths_nm: wavelengths_nm.to_vec(),
            intensity: counts.iter().map(|&c| f64::from(c) / total).collect(),
        })
    }

    /// Restrict to `range` (inclusive bounds), preserving order.
    pub fn cut(&self, range: &WavelengthRange) -> Self {
        let (wavelengths_nm, intensity): (Vec<f64>, Vec<f64>) = self
            .wavelengths_nm
            .iter()
            .zip(&self.intensity)
            .filter(|(w, _)| range.contains(**w))
            .map(|(w, i)| (*w, *i))
            .unzip();
        Self {
            wavelengths_nm,
            intensity,
        }
    }

    pub fn wavelengths_nm(&self) -> &[f64] {
        &self.wavelengths_nm
    }

    pub fn intensity(&self) -> &[f64] {
        &self.intensity
    }

    pub fn len(&self) -> usize {
        self.intensity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensity.is_empty()
    }
}

/// Where the wavelength axis of a run came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisSource {
    /// Operator-supplied calibration (CSV or polynomial).
    Calibration,
    /// The `wavelengths` array of the stream's meta message.
    Meta,
    /// No calibration anywhere: pixel indices stand in for wavelengths.
    PixelIndex,
}

/// Pick the wavelength axis for a stream.
///
/// An explicit calibration wins over the meta wavelengths, which win over
/// plain pixel indices. Whatever is chosen must have `num_pixels` entries.
pub fn resolve_axis(
    calibration: Option<Vec<f64>>,
    meta: &StreamMeta,
) -> Result<(Vec<f64>, AxisSource), SpectrumError> {
    let (axis, source) = match (calibration, meta.wavelengths.as_ref()) {
        (Some(cal), _) => (cal, AxisSource::Calibration),
        (None, Some(w)) => (w.clone(), AxisSource::Meta),
        (None, None) => (
            (0..meta.num_pixels).map(|i| i as f64).collect(),
            AxisSource::PixelIndex,
        ),
    };
    if axis.len() != meta.num_pixels {
        return Err(SpectrumError::LengthMismatch {
            wavelengths: axis.len(),
            counts: meta.num_pixels,
        });
    }
    if axis.iter().any(|w| !w.is_finite()) {
        return Err(SpectrumError::NonFinite);
    }
    Ok((axis, source))
}
