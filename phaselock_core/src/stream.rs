//! Line-delimited JSON stream from the acquisition process.
//!
//! The producer writes one JSON object per line, tagged by `type`:
//! a single `meta` first, then `config` whenever acquisition settings change
//! and a `frame` per spectrum. `StreamReader` decodes those lines lazily.
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Static stream information, sent once before anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub device_index: u32,
    pub num_pixels: usize,
    /// Calibrated axis reported by the driver, if it has one.
    #[serde(default)]
    pub wavelengths: Option<Vec<f64>>,
    #[serde(default)]
    pub exposure_ms: Option<f64>,
    #[serde(default)]
    pub average: Option<u32>,
    #[serde(default)]
    pub dark_subtraction: Option<u8>,
}

/// Acquisition settings, re-sent whenever the operator applies new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub timestamp: String,
    pub device_index: u32,
    pub exposure_ms: f64,
    pub average: u32,
    /// 0 = off, 1 = on
    pub dark_subtraction: u8,
    pub mode: i32,
    pub scan_delay: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// ISO-8601 acquisition time as produced by the acquisition host.
    pub timestamp: String,
    pub device_index: u32,
    pub counts: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Meta(StreamMeta),
    Config(AcquisitionConfig),
    Frame(Frame),
}

impl StreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Meta(_) => "meta",
            Self::Config(_) => "config",
            Self::Frame(_) => "frame",
        }
    }
}

/// Decode one line; `None` for blank, malformed or unknown messages.
pub fn decode_line(line: &str) -> Option<StreamMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<StreamMessage>(line) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::trace!(error = %e, "skipping undecodable stream line");
            None
        }
    }
}

/// Whether an undecodable line still claims to be a frame.
fn is_frame_line(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .is_ok_and(|v| v.get("type").and_then(serde_json::Value::as_str) == Some("frame"))
}

/// Lazy reader over a producer's output.
///
/// Created by [`StreamReader::connect`], which consumes the `meta` message.
/// Iterating yields every later decodable message; the sequence ends at EOF
/// or on the first read error and cannot be restarted.
pub struct StreamReader<R> {
    reader: R,
    line: Vec<u8>,
    done: bool,
    skipped: u64,
    rejected_frames: u64,
}

impl<R: BufRead> StreamReader<R> {
    /// Read up to and including the `meta` message.
    ///
    /// Blank lines before it are tolerated; anything else is a startup error.
    pub fn connect(reader: R) -> Result<(StreamMeta, Self), TransportError> {
        let mut this = Self {
            reader,
            line: Vec::with_capacity(64 * 1024),
            done: false,
            skipped: 0,
            rejected_frames: 0,
        };
        loop {
            if !this
                .read_line()
                .map_err(|e| TransportError::Io(e.to_string()))?
            {
                return Err(TransportError::StreamClosedBeforeMeta);
            }
            let text = std::str::from_utf8(&this.line).map_err(|_| {
                TransportError::UnexpectedFirstMessage("line with invalid UTF-8".into())
            })?;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }
            return match serde_json::from_str::<StreamMessage>(text) {
                Ok(StreamMessage::Meta(meta)) => {
                    tracing::debug!(
                        device_index = meta.device_index,
                        num_pixels = meta.num_pixels,
                        has_wavelengths = meta.wavelengths.is_some(),
                        "stream meta received"
                    );
                    Ok((meta, this))
                }
                Ok(other) => Err(TransportError::UnexpectedFirstMessage(
                    other.kind().to_string(),
                )),
                Err(e) => Err(TransportError::UnexpectedFirstMessage(format!(
                    "undecodable line ({e})"
                ))),
            };
        }
    }

    /// Lines after `meta` that were dropped as malformed.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Lines tagged `frame` that failed to decode, e.g. negative counts.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames
    }

    /// Only the frames of the remaining stream.
    pub fn frames(self) -> impl Iterator<Item = Frame> {
        self.filter_map(|msg| match msg {
            StreamMessage::Frame(f) => Some(f),
            _ => None,
        })
    }

    fn read_line(&mut self) -> std::io::Result<bool> {
        self.line.clear();
        Ok(self.reader.read_until(b'\n', &mut self.line)? > 0)
    }
}

impl<R: BufRead> Iterator for StreamReader<R> {
    type Item = StreamMessage;

    fn next(&mut self) -> Option<StreamMessage> {
        while !self.done {
            match self.read_line() {
                Ok(false) => {
                    tracing::debug!(skipped = self.skipped, "stream ended");
                    self.done = true;
                }
                Ok(true) => {
                    let Ok(text) = std::str::from_utf8(&self.line) else {
                        tracing::trace!("skipping line with invalid UTF-8");
                        self.skipped += 1;
                        continue;
                    };
                    if let Some(msg) = decode_line(text) {
                        return Some(msg);
                    }
                    if text.trim().is_empty() {
                        continue;
                    }
                    self.skipped += 1;
                    if is_frame_line(text) {
                        self.rejected_frames += 1;
                        tracing::warn!(
                            rejected = self.rejected_frames,
                            "dropping frame that does not match the protocol"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stream read failed; ending stream");
                    self.done = true;
                }
            }
        }
        None
    }
}
