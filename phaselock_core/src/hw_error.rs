//! Maps `Box<dyn Error>` from the `Stage` boundary to a typed `ActuatorError`.
//!
//! `phaselock_traits` uses `Box<dyn Error + Send + Sync>` so backends stay
//! independent of this crate; with the `hardware-errors` feature the
//! `phaselock_hardware::HwError` variants are downcast precisely.

use crate::error::ActuatorError;

/// Map a trait-boundary error to a typed `ActuatorError`.
///
/// Known hardware error types are downcast first, everything else falls back
/// to string heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ActuatorError {
    #[cfg(feature = "hardware-errors")]
    {
        use phaselock_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::MoveTimeout { .. } => ActuatorError::Timeout,
                other => ActuatorError::Hardware(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ActuatorError::Timeout
    } else {
        ActuatorError::Hardware(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_detects_timeouts() {
        let e = std::io::Error::other("serial Timeout after 10s");
        assert_eq!(map_hw_error(&e), ActuatorError::Timeout);
        let e = std::io::Error::other("port vanished");
        assert_eq!(
            map_hw_error(&e),
            ActuatorError::Hardware("port vanished".into())
        );
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_error_is_downcast() {
        use phaselock_hardware::error::HwError;
        let e = HwError::MoveTimeout { waited_ms: 10_000 };
        assert_eq!(map_hw_error(&e), ActuatorError::Timeout);
        let e = HwError::Protocol("bad reply".into());
        assert!(matches!(map_hw_error(&e), ActuatorError::Hardware(s) if s.contains("bad reply")));
    }
}
