use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("stream closed before the meta message")]
    StreamClosedBeforeMeta,
    #[error("expected meta as first message, got {0}")]
    UnexpectedFirstMessage(String),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("length mismatch: {wavelengths} wavelengths, {counts} counts")]
    LengthMismatch { wavelengths: usize, counts: usize },
    #[error("total counts are zero")]
    ZeroCounts,
    #[error("non-finite wavelength or intensity")]
    NonFinite,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("length mismatch: {x} abscissae, {y} ordinates")]
    LengthMismatch { x: usize, y: usize },
    #[error("model produced a non-finite value")]
    NonFinite,
    #[error("solver stalled: damping grew without reducing the cost")]
    Stalled,
    #[error("no convergence within {evaluations} evaluations")]
    NoConvergence { evaluations: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActuatorError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("timeout waiting for stage")]
    Timeout,
    #[error("actuator faulted; home the stage before moving again")]
    Faulted,
    #[error("requested step {requested:.3}° exceeds the {max:.3}° limit")]
    StepTooLarge { requested: f64, max: f64 },
    #[error("invalid rotation delta: {0}")]
    InvalidDelta(f64),
}

/// Fatal conditions that end the control loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhaseLockError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Actuator(#[from] ActuatorError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing stage")]
    MissingStage,
    #[error("missing wavelength axis")]
    MissingWavelengths,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
