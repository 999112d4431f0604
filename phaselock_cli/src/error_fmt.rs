//! Human-readable error descriptions and structured JSON error formatting.

use phaselock_core::error::{
    ActuatorError, BuildError, PhaseLockError, SpectrumError, TransportError,
};

fn transport_error(err: &eyre::Report) -> Option<&TransportError> {
    err.downcast_ref::<TransportError>().or_else(|| {
        match err.downcast_ref::<PhaseLockError>() {
            Some(PhaseLockError::Transport(t)) => Some(t),
            _ => None,
        }
    })
}

fn actuator_error(err: &eyre::Report) -> Option<&ActuatorError> {
    err.downcast_ref::<ActuatorError>().or_else(|| {
        match err.downcast_ref::<PhaseLockError>() {
            Some(PhaseLockError::Actuator(a)) => Some(a),
            _ => None,
        }
    })
}

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingStage => {
                "What happened: No stage was provided to the phase lock.\nLikely causes: The rotation stage failed to initialize or was not wired into the builder.\nHow to fix: Check [stage] in the config and the serial connection.".to_string()
            }
            BuildError::MissingWavelengths => {
                "What happened: No wavelength axis was provided to the phase lock.\nLikely causes: The stream meta message was not processed.\nHow to fix: Re-run with --log-level=debug to see the stream startup.".to_string()
            }
            BuildError::InvalidConfig(msg) if msg.contains("does not overlap") => {
                "What happened: The analysis window lies outside the spectrometer's wavelength axis.\nLikely causes: No wavelength calibration (pixel indices are used instead), or wrong [analysis] bounds.\nHow to fix: Provide --calibration, analysis.wavelength_csv or analysis.wavelength_lut, or fix wavelength_min_nm/wavelength_max_nm.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/phaselock.toml for a sample."
            ),
        };
    }

    if let Some(te) = transport_error(err) {
        return match te {
            TransportError::StreamClosedBeforeMeta => {
                "What happened: The acquisition stream ended before its meta message.\nLikely causes: The producer crashed at startup or the spectrometer was not found.\nHow to fix: Run the producer command by hand and check its stderr.".to_string()
            }
            TransportError::UnexpectedFirstMessage(kind) => format!(
                "What happened: The acquisition stream did not start with a meta message (got {kind}).\nLikely causes: The producer prints other output to stdout, or is the wrong program.\nHow to fix: Make sure stdout carries only the JSON-lines protocol."
            ),
            TransportError::Io(e) => format!(
                "What happened: Reading the acquisition stream failed ({e}).\nLikely causes: The producer pipe was closed unexpectedly.\nHow to fix: Check the producer's stderr and rerun."
            ),
        };
    }

    if let Some(ae) = actuator_error(err) {
        return match ae {
            ActuatorError::Timeout => "What happened: The rotation stage did not finish its move in time.\nLikely causes: Stage blocked, wrong bus address, or stage.move_timeout_ms too low.\nHow to fix: Check the mount and [stage] address, then run `phaselock home`.".to_string(),
            ActuatorError::Faulted => "What happened: The stage is faulted after an earlier error.\nLikely causes: A previous move failed.\nHow to fix: Run `phaselock home` to clear the fault.".to_string(),
            ActuatorError::Hardware(msg) => format!(
                "What happened: The rotation stage reported an error ({msg}).\nLikely causes: Serial cable unplugged, wrong port, or a device-side fault.\nHow to fix: Check [stage] port/address and the USB connection, then run `phaselock home`."
            ),
            ActuatorError::StepTooLarge { requested, max } => format!(
                "What happened: A correction of {requested:.2}° exceeded the {max:.2}° step limit.\nLikely causes: Corrector gain too high for stage.max_step_deg.\nHow to fix: Lower corrector.gain or raise stage.max_step_deg (at most stage.recovery_deg)."
            ),
            ActuatorError::InvalidDelta(d) => format!(
                "What happened: The corrector produced an invalid rotation ({d}).\nLikely causes: A degenerate fit.\nHow to fix: Re-run with --log-level=debug and review the [fit] guess."
            ),
        };
    }

    if let Some(SpectrumError::LengthMismatch {
        wavelengths,
        counts,
    }) = err.downcast_ref::<SpectrumError>()
    {
        return format!(
            "What happened: The wavelength axis has {wavelengths} entries but the spectrometer has {counts} pixels.\nLikely causes: Calibration file for a different device.\nHow to fix: Use the calibration CSV or LUT that belongs to this spectrometer."
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("wavelength csv must have headers") {
        return "Invalid headers in wavelength CSV. Expected 'pixel,wavelength_nm'.".to_string();
    }

    if lower.contains("no producer command") || lower.contains("spawn producer") {
        return format!(
            "What happened: The acquisition producer could not be started ({msg}).\nLikely causes: stream.command is empty or points to a missing program.\nHow to fix: Set stream.command, pass the command after `--`, or use --stdin."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        let cause = err.source().map(|s| format!(" Cause: {s}")).unwrap_or_default();
        return format!(
            "What happened: The config file could not be loaded.{cause}\nHow to fix: Check --config and the TOML syntax."
        );
    }

    if lower.starts_with("analysis")
        || lower.starts_with("fit")
        || lower.starts_with("corrector")
        || lower.starts_with("stage")
        || lower.starts_with("runner")
        || lower.starts_with("logging")
        || lower.starts_with("stream")
    {
        return format!(
            "What happened: Invalid configuration ({msg}).\nHow to fix: Edit the config file, then rerun."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 invalid setup, 3 stream failure, 4 stage timeout, 5 stage fault, 1 other.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if transport_error(err).is_some() {
        return 3;
    }
    match actuator_error(err) {
        Some(ActuatorError::Timeout) => 4,
        Some(_) => 5,
        None => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "InvalidSetup";
    }
    if transport_error(err).is_some() {
        return "Stream";
    }
    match actuator_error(err) {
        Some(ActuatorError::Timeout) => "StageTimeout",
        Some(_) => "StageFault",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "message": humanize(err),
        "exit_code": exit_code_for_error(err),
    })
    .to_string()
}
