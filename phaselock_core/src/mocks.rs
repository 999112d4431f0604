//! Test and helper mocks for phaselock_core

use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageCall {
    Move(f64),
    Home,
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<StageCall>,
    fail_move: Option<String>,
    fail_home: Option<String>,
}

/// A stage that records every command. Clones share the same log, so a test
/// can keep a handle after moving the stage into a driver.
#[derive(Debug, Clone, Default)]
pub struct RecordingStage {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands that reached the stage, failed ones excluded.
    pub fn calls(&self) -> Vec<StageCall> {
        self.with(|r| r.calls.clone())
    }

    /// Make the next relative move fail with `msg`.
    pub fn fail_next_move(&self, msg: &str) {
        self.with(|r| r.fail_move = Some(msg.to_string()));
    }

    /// Make the next home fail with `msg`.
    pub fn fail_next_home(&self, msg: &str) {
        self.with(|r| r.fail_home = Some(msg.to_string()));
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorder) -> T) -> T {
        let mut g = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut g)
    }
}

impl phaselock_traits::Stage for RecordingStage {
    fn move_relative(
        &mut self,
        degrees: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.with(|r| match r.fail_move.take() {
            Some(msg) => Err(std::io::Error::other(msg).into()),
            None => {
                r.calls.push(StageCall::Move(degrees));
                Ok(())
            }
        })
    }

    fn home(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.with(|r| match r.fail_home.take() {
            Some(msg) => Err(std::io::Error::other(msg).into()),
            None => {
                r.calls.push(StageCall::Home);
                Ok(())
            }
        })
    }
}
