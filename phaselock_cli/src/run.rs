//! Hardware assembly, stream wiring and the `run`, `self-check` and `home` commands.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::{Report, Result, WrapErr, eyre};
use phaselock_config::{Config, StageCfg};
use phaselock_core::util::{synthetic_counts, uniform_axis};
use phaselock_core::{
    ActuatorDriver, AxisSource, ConfigMailbox, EstimatorCfg, FrameBuffer, IterationStatus,
    LoopInputs, PhaseEstimator, PhaseLock, RunExit, RunSummary, Spectrum, StreamMeta,
    StreamPump, StreamReader, resolve_axis, wrap_half_period,
};
use phaselock_traits::{MonotonicClock, Stage};

/// Where the acquisition stream comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Stdin,
    /// Spawn this command; empty means `stream.command` from the config.
    Producer(Vec<String>),
}

/// Kills and reaps the producer when the run is over.
struct ProducerGuard(Option<Child>);

impl Drop for ProducerGuard {
    fn drop(&mut self) {
        let Some(mut child) = self.0.take() else {
            return;
        };
        // Already exited after closing its output: kill fails harmlessly.
        let _ = child.kill();
        match child.wait() {
            Ok(status) => tracing::debug!(%status, "producer exited"),
            Err(e) => tracing::warn!(error = %e, "failed to reap producer"),
        }
    }
}

fn open_source(
    source: &Source,
    cfg: &phaselock_config::StreamCfg,
) -> Result<(Box<dyn BufRead + Send>, ProducerGuard)> {
    let argv = match source {
        Source::Stdin => {
            tracing::info!("reading acquisition stream from stdin");
            return Ok((
                Box::new(BufReader::new(std::io::stdin())),
                ProducerGuard(None),
            ));
        }
        Source::Producer(cmd) if !cmd.is_empty() => cmd.as_slice(),
        Source::Producer(_) => cfg.command.as_slice(),
    };
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| eyre!("no producer command: set stream.command or pass --stdin"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    if let Some(dir) = &cfg.working_dir {
        cmd.current_dir(dir);
    }
    let mut child = cmd
        .spawn()
        .wrap_err_with(|| format!("spawn producer `{program}`"))?;
    tracing::info!(program, pid = child.id(), "producer started");
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| eyre!("producer stdout was not captured"))?;
    Ok((
        Box::new(BufReader::new(stdout)),
        ProducerGuard(Some(child)),
    ))
}

/// The configured stage and a label for it: an ELL14 when a port is set
/// (and compiled in), otherwise the simulator.
pub fn make_stage(cfg: &StageCfg) -> Result<(Box<dyn Stage + Send>, String)> {
    #[cfg(feature = "hardware")]
    {
        if let Some(port) = &cfg.port {
            let opts = phaselock_hardware::Ell14Options {
                address: cfg.address.clone(),
                pulses_per_degree: cfg.pulses_per_degree,
                move_timeout: Duration::from_millis(cfg.move_timeout_ms),
                ..phaselock_hardware::Ell14Options::default()
            };
            let stage =
                phaselock_hardware::Ell14Stage::open(port, &opts, Arc::new(MonotonicClock::new()))
                    .wrap_err_with(|| format!("open ELL14 stage on {port}"))?;
            return Ok((Box::new(stage), format!("ELL14 on {port}")));
        }
    }
    #[cfg(not(feature = "hardware"))]
    {
        if let Some(port) = &cfg.port {
            tracing::warn!(
                port,
                "built without the `hardware` feature; using the simulated stage"
            );
        }
    }
    tracing::info!("using simulated stage");
    Ok((
        Box::new(phaselock_hardware::SimulatedStage::new()),
        "simulated".to_string(),
    ))
}

/// Calibration CSV from the command line or config, read before anything starts.
fn load_calibration_csv(cfg: &Config, override_path: Option<&Path>) -> Result<Option<Vec<f64>>> {
    let Some(path) = override_path.or(cfg.analysis.wavelength_csv.as_deref()) else {
        return Ok(None);
    };
    let axis = phaselock_config::load_wavelength_csv(path)?;
    tracing::info!(path = %path.display(), pixels = axis.len(), "wavelength calibration loaded");
    Ok(Some(axis))
}

fn stream_axis(
    cfg: &Config,
    csv: Option<Vec<f64>>,
    meta: &StreamMeta,
) -> Result<(Vec<f64>, AxisSource)> {
    let calibration = csv.or_else(|| {
        cfg.analysis
            .wavelength_lut
            .as_ref()
            .map(|lut| phaselock_config::lut_wavelengths(lut, meta.num_pixels))
    });
    let (axis, source) = resolve_axis(calibration, meta)
        .map_err(Report::new)
        .wrap_err("wavelength axis does not match the stream")?;
    if source == AxisSource::PixelIndex {
        tracing::warn!("no wavelength calibration; using pixel indices as the axis");
    }
    Ok((axis, source))
}

pub fn build_lock(cfg: &Config, axis: Vec<f64>, stage: Box<dyn Stage + Send>) -> Result<PhaseLock> {
    PhaseLock::builder()
        .with_stage(stage)
        .with_wavelengths(axis)
        .with_range((&cfg.analysis).into())
        .with_estimator((&cfg.fit).into())
        .with_corrector((&cfg.corrector).into())
        .with_actuator((&cfg.stage).into())
        .with_loop((&cfg.runner).into())
        .build()
}

fn print_status(s: &IterationStatus, json: bool) {
    if json {
        match serde_json::to_string(s) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode iteration"),
        }
        return;
    }
    let recovery = s
        .recovery_deg
        .map(|r| format!(" (recovery {r:+.1}°)"))
        .unwrap_or_default();
    println!(
        "#{seq} phase {phase:+.2}° error {err:+.2}° move {delta:+.3}°{recovery} position {pos:+.2}°",
        seq = s.seq,
        phase = s.wrapped_deg,
        err = s.error_deg,
        delta = s.delta_deg,
        pos = s.position_deg,
    );
}

fn exit_name(exit: RunExit) -> &'static str {
    match exit {
        RunExit::StreamEnded => "stream_ended",
        RunExit::Shutdown => "shutdown",
    }
}

pub fn run_lock(
    cfg: &Config,
    calibration: Option<&Path>,
    source: &Source,
    json: bool,
    shutdown: &AtomicBool,
) -> Result<RunSummary> {
    let csv = load_calibration_csv(cfg, calibration)?;
    let (stage, _) = make_stage(&cfg.stage)?;
    let (input, producer) = open_source(source, &cfg.stream)?;

    let (meta, reader) = StreamReader::connect(input)
        .map_err(Report::new)
        .wrap_err("waiting for the stream meta message")?;
    let (axis, axis_source) = stream_axis(cfg, csv, &meta)?;
    tracing::info!(
        device_index = meta.device_index,
        pixels = meta.num_pixels,
        ?axis_source,
        "stream connected"
    );

    let mut lock = build_lock(cfg, axis, stage)?;
    if cfg.stage.home_on_start {
        lock.home()
            .map_err(Report::new)
            .wrap_err("home stage before locking")?;
    }

    let buffer = Arc::new(FrameBuffer::new());
    let mailbox = Arc::new(ConfigMailbox::new());
    let mut pump = StreamPump::spawn(reader, buffer.clone(), mailbox.clone());

    let result = {
        let mut finished = || pump.is_finished();
        lock.run(
            LoopInputs {
                buffer: &buffer,
                mailbox: Some(&mailbox),
                source_finished: &mut finished,
                shutdown,
            },
            &mut |s| print_status(s, json),
        )
    };

    // Ending the producer closes the pipe the pump may be blocked on.
    pump.shutdown();
    drop(producer);
    if pump.wait(Duration::from_secs(1)).is_none() {
        tracing::debug!("stream pump still running at exit");
    }

    let (exit, summary) = result.map_err(Report::new)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "exit": exit_name(exit), "summary": summary })
        );
    } else {
        println!(
            "{}: {} frames processed, {} skipped, {} corrections, {} recoveries",
            exit_name(exit),
            summary.frames_processed,
            summary.frames_skipped,
            summary.corrections,
            summary.recoveries
        );
    }
    Ok(summary)
}

/// Open the stage and fit a noise-free spectrum built from the configured guess.
///
/// The stage is not moved; opening it checks the port and bus address.
pub fn self_check(cfg: &Config, calibration: Option<&Path>, json: bool) -> Result<()> {
    if let Some(axis) = load_calibration_csv(cfg, calibration)? {
        tracing::debug!(pixels = axis.len(), "calibration CSV ok");
    }
    let (stage, stage_label) = make_stage(&cfg.stage)?;
    drop(stage);
    tracing::info!(stage = %stage_label, "stage opened");

    const PIXELS: usize = 400;
    let (lo, hi) = (cfg.analysis.wavelength_min_nm, cfg.analysis.wavelength_max_nm);
    let axis = uniform_axis(lo, (hi - lo) / (PIXELS - 1) as f64, PIXELS);
    let est_cfg = EstimatorCfg::from(&cfg.fit);
    let truth = est_cfg.initial;
    let counts = synthetic_counts(&axis, &truth, 20_000.0);
    let spectrum = Spectrum::from_raw_data(&axis, &counts)
        .map_err(Report::new)
        .wrap_err("synthetic spectrum from the fit guess is empty")?;

    let mut estimator = PhaseEstimator::new(est_cfg);
    let estimate = estimator
        .update(&spectrum)
        .map_err(Report::new)
        .wrap_err("self-check fit failed")?;
    let phase_error_deg = wrap_half_period(estimate.phase_rad - truth.phase_rad).to_degrees();
    if estimate.r_squared < 0.99 {
        eyre::bail!(
            "self-check fit is poor (R² = {:.4}); review the [fit] guess",
            estimate.r_squared
        );
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "r_squared": estimate.r_squared,
                "phase_error_deg": phase_error_deg,
                "evaluations": estimate.evaluations,
                "stage": stage_label,
            })
        );
    } else {
        println!(
            "self-check ok: R² {:.5}, phase error {:+.3}°, {} evaluations, stage: {}",
            estimate.r_squared, phase_error_deg, estimate.evaluations, stage_label
        );
    }
    Ok(())
}

pub fn home(cfg: &Config, json: bool) -> Result<()> {
    let (stage, _) = make_stage(&cfg.stage)?;
    let clock = Arc::new(MonotonicClock::new());
    let mut driver =
        ActuatorDriver::new(stage, (&cfg.stage).into(), clock).map_err(Report::new)?;
    driver.home().map_err(Report::new).wrap_err("home stage")?;
    if json {
        println!("{}", serde_json::json!({ "homed": true }));
    } else {
        println!("stage homed");
    }
    Ok(())
}
