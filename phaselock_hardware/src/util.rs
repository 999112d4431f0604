use std::time::Duration;

use phaselock_traits::Clock;

use crate::error::{HwError, Result};

/// Call `done` until it reports true, sleeping `poll` between attempts.
///
/// Gives up with `HwError::MoveTimeout` once `timeout` has passed on `clock`.
/// Errors from `done` are returned immediately.
pub fn poll_until(
    clock: &dyn Clock,
    timeout: Duration,
    poll: Duration,
    mut done: impl FnMut() -> Result<bool>,
) -> Result<()> {
    let start = clock.now();
    let limit_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    loop {
        if done()? {
            return Ok(());
        }
        let waited_ms = clock.ms_since(start);
        if waited_ms >= limit_ms {
            return Err(HwError::MoveTimeout { waited_ms });
        }
        clock.sleep(poll);
    }
}
