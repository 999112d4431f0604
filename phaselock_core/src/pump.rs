//! Background stream reader.
//!
//! Spawns a thread that owns the `StreamReader`, moves frames into the
//! `FrameBuffer` and acquisition configs into the `ConfigMailbox`, and does
//! nothing else. Its exit reason is reported over a bounded channel.
//!
//! Dropping the pump raises the shutdown flag. The thread is joined if it has
//! already stopped; a thread still blocked on input is left detached, since a
//! blocking read cannot be interrupted from here.
use crate::buffer::FrameBuffer;
use crate::mailbox::ConfigMailbox;
use crate::stream::{AcquisitionConfig, StreamMessage, StreamReader};
use crossbeam_channel as xch;
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The producer closed its output.
    StreamEnded,
    /// `shutdown` was requested.
    Shutdown,
}

pub struct StreamPump {
    exit_rx: xch::Receiver<PumpExit>,
    exit: Option<PumpExit>,
    frames: Arc<AtomicU64>,
    /// Shutdown flag (lock-free check between messages)
    shutdown: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl StreamPump {
    pub fn spawn<R: BufRead + Send + 'static>(
        reader: StreamReader<R>,
        buffer: Arc<FrameBuffer>,
        mailbox: Arc<ConfigMailbox<AcquisitionConfig>>,
    ) -> Self {
        let (tx, exit_rx) = xch::bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let frames = Arc::new(AtomicU64::new(0));
        let frames_clone = frames.clone();

        let join_handle = std::thread::spawn(move || {
            let mut exit = PumpExit::StreamEnded;
            for msg in reader {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("stream pump received shutdown signal");
                    exit = PumpExit::Shutdown;
                    break;
                }
                match msg {
                    StreamMessage::Frame(frame) => {
                        let seq = buffer.update(frame);
                        frames_clone.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(seq, "frame buffered");
                    }
                    StreamMessage::Config(cfg) => {
                        tracing::debug!(
                            exposure_ms = cfg.exposure_ms,
                            average = cfg.average,
                            "acquisition config received"
                        );
                        mailbox.set(cfg);
                    }
                    StreamMessage::Meta(_) => {
                        tracing::debug!("ignoring repeated meta message");
                    }
                }
            }
            // Receiver may already be gone; nothing to report to then.
            let _ = tx.send(exit);
            tracing::trace!(?exit, "stream pump exiting cleanly");
        });

        Self {
            exit_rx,
            exit: None,
            frames,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Ask the thread to stop after the message it is currently reading.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Why the thread stopped, once it has.
    pub fn exit_status(&mut self) -> Option<PumpExit> {
        if self.exit.is_none() {
            self.exit = self.exit_rx.try_recv().ok();
        }
        self.exit
    }

    pub fn is_finished(&mut self) -> bool {
        self.exit_status().is_some()
    }

    /// Block until the thread stops or `timeout` passes.
    pub fn wait(&mut self, timeout: std::time::Duration) -> Option<PumpExit> {
        if self.exit.is_none() {
            self.exit = self.exit_rx.recv_timeout(timeout).ok();
        }
        self.exit
    }

    /// Frames moved into the buffer so far.
    pub fn frames_received(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl Drop for StreamPump {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let Some(handle) = self.join_handle.take() else {
            return;
        };
        if !handle.is_finished() && self.exit_status().is_none() {
            tracing::debug!("stream pump still blocked on input; detaching");
            return;
        }
        match handle.join() {
            Ok(()) => tracing::trace!("stream pump joined successfully"),
            // Thread panicked; log but don't propagate (we're in Drop)
            Err(e) => tracing::warn!(?e, "stream pump panicked"),
        }
    }
}
