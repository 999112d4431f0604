#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas and wavelength calibration parsing for the phase lock.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - The wavelength calibration CSV loader enforces headers, a contiguous
//!   pixel index and a strictly monotonic wavelength axis.
use serde::Deserialize;
use std::path::PathBuf;

/// Wavelength calibration CSV schema.
///
/// Expected headers:
/// pixel,wavelength_nm
///
/// Example:
/// pixel,wavelength_nm
/// 0,780.12
/// 1,780.17
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct WavelengthRow {
    pub pixel: usize,
    pub wavelength_nm: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StreamCfg {
    /// Producer command, e.g. `["python32.exe", "-m", "acquisition.json_stream_server"]`.
    /// Empty means the stream must be supplied on stdin.
    pub command: Vec<String>,
    /// Working directory for the producer process.
    pub working_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisCfg {
    /// Lower bound of the fitted region (inclusive).
    pub wavelength_min_nm: f64,
    /// Upper bound of the fitted region (inclusive).
    pub wavelength_max_nm: f64,
    /// Optional wavelength calibration CSV; takes precedence over everything else.
    #[serde(default)]
    pub wavelength_csv: Option<PathBuf>,
    /// Optional cubic pixel→wavelength polynomial `[c0, c1, c2, c3]`.
    /// Used when no CSV is configured; takes precedence over the stream's meta.
    #[serde(default)]
    pub wavelength_lut: Option<[f64; 4]>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FitCfg {
    pub carrier_wavelength_nm: f64,
    pub start_wavelength_nm: f64,
    pub bandwidth_nm: f64,
    pub baseline: f64,
    pub amplitude: f64,
    /// Chirp of the fringe phase in rad/nm².
    pub acceleration: f64,
    pub phase_deg: f64,
    /// Evaluation budget per fit.
    pub max_evaluations: usize,
    /// Seed baseline/amplitude from the first spectrum before the full fit.
    pub seed_linear: bool,
}

impl Default for FitCfg {
    fn default() -> Self {
        Self {
            carrier_wavelength_nm: 800.0,
            start_wavelength_nm: 790.0,
            bandwidth_nm: 12.0,
            baseline: 0.0,
            amplitude: 1.0,
            acceleration: 0.05,
            phase_deg: 0.0,
            max_evaluations: 10_000,
            seed_linear: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    /// Lock to `reference_phase_deg`.
    #[default]
    Absolute,
    /// Lock to the first wrapped phase observed after start.
    First,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CorrectorCfg {
    /// Errors with magnitude at or below this are not corrected.
    pub dead_band_deg: f64,
    /// Stage degrees per degree of phase error.
    pub gain: f64,
    /// Increasing stage angle decreases the observed phase.
    pub invert: bool,
    pub reference: ReferenceKind,
    /// Reference phase for `reference = "absolute"`.
    pub reference_phase_deg: f64,
}

impl Default for CorrectorCfg {
    fn default() -> Self {
        Self {
            dead_band_deg: 10.0,
            gain: 0.25,
            invert: true,
            reference: ReferenceKind::Absolute,
            reference_phase_deg: 0.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StageCfg {
    /// Serial port of the ELL14 (hardware builds only).
    pub port: Option<String>,
    /// Bus address, one hex digit.
    pub address: String,
    /// Symmetric safety range: the tracked position stays within ±range_deg.
    pub range_deg: f64,
    /// Magnitude of the recovery rotation issued before leaving the range.
    pub recovery_deg: f64,
    /// Largest accepted single request.
    pub max_step_deg: f64,
    /// Settle delay after each relative move.
    pub settle_ms: u64,
    /// Settle delay after homing.
    pub home_settle_ms: u64,
    /// Home the stage before the loop starts.
    pub home_on_start: bool,
    pub pulses_per_degree: f64,
    /// Max wait for the stage to report motion finished.
    pub move_timeout_ms: u64,
}

impl Default for StageCfg {
    fn default() -> Self {
        Self {
            port: None,
            address: "0".to_string(),
            range_deg: 90.0,
            recovery_deg: 90.0,
            max_step_deg: 90.0,
            settle_ms: 2000,
            home_settle_ms: 1000,
            home_on_start: true,
            pulses_per_degree: 398.2222,
            move_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RunnerCfg {
    /// Sleep between polls when no new frame is available.
    pub poll_ms: u64,
}

impl Default for RunnerCfg {
    fn default() -> Self {
        Self { poll_ms: 10 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamCfg,
    pub analysis: AnalysisCfg,
    #[serde(default)]
    pub fit: FitCfg,
    #[serde(default)]
    pub corrector: CorrectorCfg,
    #[serde(default)]
    pub stage: StageCfg,
    #[serde(default)]
    pub runner: RunnerCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Build a wavelength axis from calibration rows.
///
/// Rows must cover pixels `0..n` in order and wavelengths must be finite and
/// strictly monotonic (either direction).
pub fn wavelengths_from_rows(rows: &[WavelengthRow]) -> eyre::Result<Vec<f64>> {
    if rows.len() < 2 {
        eyre::bail!(
            "wavelength calibration requires at least two rows, got {}",
            rows.len()
        );
    }
    let mut dir: i8 = 0;
    for (i, row) in rows.iter().enumerate() {
        if row.pixel != i {
            eyre::bail!(
                "wavelength calibration pixels must be contiguous from 0; row {} has pixel {}",
                i,
                row.pixel
            );
        }
        if !row.wavelength_nm.is_finite() {
            eyre::bail!("wavelength calibration has non-finite wavelength at pixel {i}");
        }
        if i == 0 {
            continue;
        }
        let d = row.wavelength_nm - rows[i - 1].wavelength_nm;
        if d == 0.0 {
            eyre::bail!(
                "wavelength calibration has duplicate wavelengths at pixel {} and {}",
                i - 1,
                i
            );
        }
        let step_dir = if d > 0.0 { 1 } else { -1 };
        if dir == 0 {
            dir = step_dir;
        } else if dir != step_dir {
            eyre::bail!("wavelength calibration must be strictly monotonic");
        }
    }
    Ok(rows.iter().map(|r| r.wavelength_nm).collect())
}

pub fn load_wavelength_csv(path: &std::path::Path) -> eyre::Result<Vec<f64>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open wavelength CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["pixel", "wavelength_nm"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "wavelength CSV must have headers 'pixel,wavelength_nm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<WavelengthRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }

    wavelengths_from_rows(&rows)
}

/// Evaluate the spectrometer's cubic pixel→wavelength lookup polynomial.
pub fn lut_wavelengths(lut: &[f64; 4], num_pixels: usize) -> Vec<f64> {
    (0..num_pixels)
        .map(|i| {
            let x = i as f64;
            lut[0] + x * (lut[1] + x * (lut[2] + x * lut[3]))
        })
        .collect()
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Stream
        if let Some(program) = self.stream.command.first()
            && program.trim().is_empty()
        {
            eyre::bail!("stream.command program must not be empty");
        }

        // Analysis
        let a = &self.analysis;
        if !a.wavelength_min_nm.is_finite() || !a.wavelength_max_nm.is_finite() {
            eyre::bail!("analysis wavelength bounds must be finite");
        }
        if a.wavelength_min_nm >= a.wavelength_max_nm {
            eyre::bail!("analysis.wavelength_min_nm must be < analysis.wavelength_max_nm");
        }
        if let Some(lut) = &a.wavelength_lut
            && lut.iter().any(|c| !c.is_finite())
        {
            eyre::bail!("analysis.wavelength_lut coefficients must be finite");
        }

        // Fit
        let f = &self.fit;
        let guess = [
            f.carrier_wavelength_nm,
            f.start_wavelength_nm,
            f.bandwidth_nm,
            f.baseline,
            f.amplitude,
            f.acceleration,
            f.phase_deg,
        ];
        if guess.iter().any(|v| !v.is_finite()) {
            eyre::bail!("fit initial guess values must be finite");
        }
        if f.bandwidth_nm <= 0.0 {
            eyre::bail!("fit.bandwidth_nm must be > 0");
        }
        if f.max_evaluations == 0 {
            eyre::bail!("fit.max_evaluations must be >= 1");
        }

        // Corrector
        let c = &self.corrector;
        if !(0.0..90.0).contains(&c.dead_band_deg) {
            eyre::bail!("corrector.dead_band_deg must be in [0, 90)");
        }
        if !(c.gain.is_finite() && c.gain > 0.0) {
            eyre::bail!("corrector.gain must be > 0");
        }
        if !(-90.0..90.0).contains(&c.reference_phase_deg) {
            eyre::bail!("corrector.reference_phase_deg must be in [-90, 90)");
        }

        // Stage
        let s = &self.stage;
        if !(s.range_deg.is_finite() && s.range_deg > 0.0 && s.range_deg <= 180.0) {
            eyre::bail!("stage.range_deg must be in (0, 180]");
        }
        if !(s.max_step_deg > 0.0 && s.max_step_deg <= s.recovery_deg) {
            eyre::bail!("stage.max_step_deg must be in (0, stage.recovery_deg]");
        }
        if s.recovery_deg > s.range_deg {
            eyre::bail!("stage.recovery_deg must be <= stage.range_deg");
        }
        // Largest |wrapped phase − reference| the corrector can see.
        let max_error_deg = match c.reference {
            ReferenceKind::Absolute => 90.0 + c.reference_phase_deg.abs(),
            ReferenceKind::First => 180.0,
        };
        if c.gain * max_error_deg > s.max_step_deg {
            eyre::bail!(
                "corrector.gain × {max_error_deg}° of phase error exceeds stage.max_step_deg ({})",
                s.max_step_deg
            );
        }
        if !(s.pulses_per_degree.is_finite() && s.pulses_per_degree > 0.0) {
            eyre::bail!("stage.pulses_per_degree must be > 0");
        }
        if s.address.len() != 1 || !s.address.chars().all(|ch| ch.is_ascii_hexdigit()) {
            eyre::bail!("stage.address must be a single hex digit (0-F)");
        }
        if s.move_timeout_ms == 0 {
            eyre::bail!("stage.move_timeout_ms must be >= 1");
        }
        if s.settle_ms > 60_000 || s.home_settle_ms > 60_000 {
            eyre::bail!("stage settle delays are unreasonably large (>60s)");
        }

        // Runner
        if self.runner.poll_ms == 0 {
            eyre::bail!("runner.poll_ms must be >= 1");
        }
        if self.runner.poll_ms > 1000 {
            eyre::bail!("runner.poll_ms is unreasonably large (>1s)");
        }

        // Logging
        if let Some(rotation) = self.logging.rotation.as_deref()
            && !matches!(rotation, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
