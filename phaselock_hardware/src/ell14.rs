//! Blocking driver for the Thorlabs Elliptec ELL14 rotation mount.
//!
//! Generic over the byte transport so the command/poll sequence can be driven
//! from a scripted port in tests; [`Ell14Stage::open`] attaches a real serial
//! port when the `hardware` feature is enabled.
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use phaselock_traits::{Clock, Stage};

use crate::error::{HwError, Result};
use crate::protocol::{self, Reply, STATUS_BUSY, STATUS_OK};
use crate::util::poll_until;

#[derive(Debug, Clone, PartialEq)]
pub struct Ell14Options {
    /// Bus address, one hex digit.
    pub address: String,
    pub pulses_per_degree: f64,
    /// Interval between status polls while the mount is moving.
    pub poll: Duration,
    /// Longest a single move or home may take.
    pub move_timeout: Duration,
}

impl Default for Ell14Options {
    fn default() -> Self {
        Self {
            address: "0".into(),
            pulses_per_degree: protocol::DEFAULT_PULSES_PER_DEGREE,
            poll: Duration::from_millis(50),
            move_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Ell14Stage<P> {
    port: P,
    address: char,
    pulses_per_degree: f64,
    poll: Duration,
    move_timeout: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
    line: Vec<u8>,
}

impl<P> std::fmt::Debug for Ell14Stage<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ell14Stage")
            .field("address", &self.address)
            .field("pulses_per_degree", &self.pulses_per_degree)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "hardware")]
impl Ell14Stage<Box<dyn serialport::SerialPort>> {
    /// Open `path` at 9600 8N1, no flow control.
    pub fn open(
        path: &str,
        opts: &Ell14Options,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let port = serialport::new(path, 9600)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| HwError::Serial(format!("open {path}: {e}")))?;
        tracing::info!(path, address = %opts.address, "ELL14 serial port opened");
        Self::with_port(port, opts, clock)
    }
}

impl<P: Read + Write> Ell14Stage<P> {
    /// Drive a mount over an already opened transport.
    ///
    /// Reads on `port` are expected to time out (`TimedOut`/`WouldBlock`) when
    /// the device is silent.
    pub fn with_port(
        port: P,
        opts: &Ell14Options,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let address = protocol::parse_address(&opts.address)?;
        if !(opts.pulses_per_degree.is_finite() && opts.pulses_per_degree > 0.0) {
            return Err(HwError::InvalidArgument(
                "pulses_per_degree must be > 0".into(),
            ));
        }
        Ok(Self {
            port,
            address,
            pulses_per_degree: opts.pulses_per_degree,
            poll: opts.poll,
            move_timeout: opts.move_timeout,
            clock,
            line: Vec::with_capacity(32),
        })
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Rotate by `degrees` and block until the mount reports idle.
    pub fn rotate_by(&mut self, degrees: f64) -> Result<()> {
        let pulses = protocol::degrees_to_pulses(degrees, self.pulses_per_degree)?;
        if pulses == 0 {
            return Ok(());
        }
        tracing::debug!(degrees, pulses, "ELL14 relative move");
        self.send(&protocol::encode_move_relative(self.address, pulses))?;
        self.wait_idle()
    }

    /// Run the homing sequence and block until the mount reports idle.
    pub fn run_home(&mut self) -> Result<()> {
        tracing::debug!("ELL14 home");
        self.send(&protocol::encode_home(self.address))?;
        self.wait_idle()
    }

    fn send(&mut self, cmd: &str) -> Result<()> {
        self.port.write_all(cmd.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Poll `gs` until the status is no longer busy.
    fn wait_idle(&mut self) -> Result<()> {
        let clock = self.clock.clone();
        let (timeout, poll) = (self.move_timeout, self.poll);
        poll_until(clock.as_ref(), timeout, poll, || self.poll_status())
    }

    /// One status query. `Ok(true)` once the mount is idle.
    fn poll_status(&mut self) -> Result<bool> {
        self.send(&protocol::encode_get_status(self.address))?;
        loop {
            // Silence while moving is normal; ask again next poll.
            let Some(line) = self.read_line()? else {
                return Ok(false);
            };
            match protocol::parse_reply(self.address, &line)? {
                Reply::Status(STATUS_OK) => return Ok(true),
                Reply::Status(STATUS_BUSY) => return Ok(false),
                Reply::Status(code) => {
                    return Err(HwError::Protocol(format!(
                        "device status {code}: {}",
                        protocol::status_text(code)
                    )));
                }
                Reply::Position(pulses) => tracing::trace!(
                    position_deg = protocol::pulses_to_degrees(pulses, self.pulses_per_degree),
                    "ELL14 position report"
                ),
                Reply::Other(code) => tracing::trace!(%code, "ignoring ELL14 reply"),
            }
        }
    }

    /// Next CR LF terminated reply, or `None` if the read timed out first.
    fn read_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => self.line.push(byte[0]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if !self.line.is_empty() {
                        tracing::trace!(partial = self.line.len(), "ELL14 reply cut short");
                    }
                    return Ok(None);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        String::from_utf8(std::mem::take(&mut self.line))
            .map(Some)
            .map_err(|_| HwError::Protocol("reply is not ASCII".into()))
    }
}

impl<P: Read + Write> Stage for Ell14Stage<P> {
    fn move_relative(
        &mut self,
        degrees: f64,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.rotate_by(degrees).map_err(Into::into)
    }

    fn home(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.run_home().map_err(Into::into)
    }
}
