//! Rotation mount backends for the phase lock.
//!
//! [`SimulatedStage`] is always available. The ELL14 driver and its protocol
//! helpers compile everywhere; opening a real serial port needs the
//! `hardware` feature.
pub mod ell14;
pub mod error;
pub mod protocol;
pub mod util;

pub use ell14::{Ell14Options, Ell14Stage};
pub use error::HwError;

use phaselock_traits::Stage;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct SimState {
    angle_deg: f64,
    moves: u64,
    homes: u64,
}

/// In-memory rotation mount. Clones share state, so a handle kept outside
/// the control loop can observe the angle.
#[derive(Debug, Clone, Default)]
pub struct SimulatedStage {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute angle since construction; homing returns it to 0.
    pub fn angle_deg(&self) -> f64 {
        self.with(|s| s.angle_deg)
    }

    pub fn moves(&self) -> u64 {
        self.with(|s| s.moves)
    }

    pub fn homes(&self) -> u64 {
        self.with(|s| s.homes)
    }

    fn with<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut g = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut g)
    }
}

impl Stage for SimulatedStage {
    fn move_relative(
        &mut self,
        degrees: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !degrees.is_finite() {
            return Err(HwError::InvalidArgument(format!("rotation {degrees}")).into());
        }
        self.with(|s| {
            s.angle_deg += degrees;
            s.moves += 1;
        });
        tracing::trace!(degrees, angle_deg = self.angle_deg(), "simulated move");
        Ok(())
    }

    fn home(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.with(|s| {
            s.angle_deg = 0.0;
            s.homes += 1;
        });
        tracing::trace!("simulated home");
        Ok(())
    }
}
