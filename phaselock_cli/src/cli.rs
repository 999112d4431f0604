//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "phaselock", version, about = "Spectral phase lock for a rotation stage")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/phaselock.toml")]
    pub config: PathBuf,

    /// Wavelength calibration CSV (strict `pixel,wavelength_nm` header);
    /// overrides analysis.wavelength_csv
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Emit JSON lines (iterations, summary, errors, logs) instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lock the spectral phase until the stream ends or Ctrl-C
    Run {
        /// Read the acquisition stream from stdin instead of spawning a producer
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "producer")]
        stdin: bool,
        /// Producer command overriding stream.command, e.g. `-- python acquire.py`
        #[arg(last = true, value_name = "CMD")]
        producer: Vec<String>,
    },
    /// Validate the config and fit a synthetic spectrum
    SelfCheck,
    /// Home the rotation stage and exit
    Home,
}
