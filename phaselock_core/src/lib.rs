#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core phase-locking logic (hardware-agnostic).
//!
//! This crate turns a stream of spectrometer frames into relative rotations of
//! a motorized stage that hold the measured spectral phase at a reference
//! value. All hardware interaction goes through `phaselock_traits::Stage`.
//!
//! ## Architecture
//!
//! - **Transport**: newline-delimited JSON from the acquisition process (`stream`)
//! - **Buffering**: latest-frame slot and acquisition-config mailbox (`buffer`, `mailbox`)
//! - **Reader thread**: moves stream messages into the shared slots (`pump`)
//! - **Spectrum**: calibrated axis, window cut (`spectrum`)
//! - **Estimation**: projection model and Levenberg–Marquardt fit (`model`, `fit`, `estimator`)
//! - **Correction**: π-periodic wrapping, dead band, gain (`corrector`)
//! - **Actuation**: position tracking and range recovery (`actuator`)
//! - **Loop**: builder and runner (`builder`, `runner`)
//!
//! ## Units
//!
//! Phases are radians internally; stage motion and operator-facing settings
//! are degrees. Wavelengths are nanometres.

pub mod actuator;
pub mod buffer;
pub mod builder;
pub mod config;
pub mod conversions;
pub mod corrector;
pub mod error;
pub mod estimator;
pub mod fit;
pub mod hw_error;
pub mod mailbox;
pub mod mocks;
pub mod model;
pub mod pump;
pub mod runner;
pub mod spectrum;
pub mod stream;
pub mod util;

pub use actuator::{ActuatorDriver, RotateOutcome};
pub use buffer::FrameBuffer;
pub use builder::PhaseLockBuilder;
pub use config::{ActuatorCfg, CorrectorCfg, EstimatorCfg, LoopCfg, ReferenceMode};
pub use corrector::{Correction, PhaseCorrector, wrap_half_period};
pub use error::{
    ActuatorError, BuildError, FitError, PhaseLockError, Report, Result, SpectrumError,
    TransportError,
};
pub use estimator::{Estimate, EstimatorState, PhaseEstimator};
pub use mailbox::ConfigMailbox;
pub use model::{FitParameters, Projection};
pub use pump::{PumpExit, StreamPump};
pub use runner::{
    IterationStatus, LoopInputs, PhaseLock, RunExit, RunSummary, SkipReason, StepOutcome,
};
pub use spectrum::{AxisSource, Spectrum, WavelengthRange, resolve_axis};
pub use stream::{AcquisitionConfig, Frame, StreamMessage, StreamMeta, StreamReader};
