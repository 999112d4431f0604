//! Hardware seams shared by the phase-lock crates.
//!
//! The control loop only ever talks to a rotation mount through [`Stage`];
//! concrete backends live in `phaselock_hardware`.

pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// A motorized rotation mount driven with relative moves.
///
/// Implementations block until the physical motion has finished (or failed).
/// Angles are in stage degrees.
pub trait Stage {
    fn move_relative(
        &mut self,
        degrees: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn home(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn move_relative(
        &mut self,
        degrees: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).move_relative(degrees)
    }

    fn home(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).home()
    }
}
