//! Single-slot latest-frame cache shared by the stream pump and the control loop.
use crate::stream::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Slot {
    seq: u64,
    frame: Option<Arc<Frame>>,
}

/// Holds only the most recent frame; older frames are discarded on update.
///
/// Every update bumps a sequence number so a reader can ask for
/// "anything newer than what I already processed" via [`FrameBuffer::get_newer`].
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame unconditionally; returns its sequence number.
    pub fn update(&self, frame: Frame) -> u64 {
        let frame = Arc::new(frame);
        let mut slot = self.lock();
        slot.seq = slot.seq.wrapping_add(1);
        slot.frame = Some(frame);
        slot.seq
    }

    pub fn get_latest(&self) -> Option<Arc<Frame>> {
        self.lock().frame.clone()
    }

    /// The stored frame and its sequence number if it arrived after `seen`.
    pub fn get_newer(&self, seen: u64) -> Option<(u64, Arc<Frame>)> {
        let slot = self.lock();
        if slot.seq == seen {
            return None;
        }
        slot.frame.clone().map(|f| (slot.seq, f))
    }

    /// Number of updates so far.
    pub fn sequence(&self) -> u64 {
        self.lock().seq
    }

    // A panicking writer cannot leave the slot half-written.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u32) -> Frame {
        Frame {
            timestamp: format!("t{tag}"),
            device_index: 0,
            counts: vec![tag; 4],
        }
    }

    #[test]
    fn empty_buffer_has_nothing() {
        let b = FrameBuffer::new();
        assert!(b.get_latest().is_none());
        assert!(b.get_newer(0).is_none());
        assert_eq!(b.sequence(), 0);
    }

    #[test]
    fn latest_update_wins() {
        let b = FrameBuffer::new();
        b.update(frame(1));
        b.update(frame(2));
        assert_eq!(*b.get_latest().unwrap(), frame(2));
        // Reading does not consume the slot.
        assert_eq!(*b.get_latest().unwrap(), frame(2));
        assert_eq!(b.sequence(), 2);
    }

    #[test]
    fn get_newer_skips_already_seen() {
        let b = FrameBuffer::new();
        let s1 = b.update(frame(1));
        let (seq, f) = b.get_newer(0).unwrap();
        assert_eq!((seq, f.counts[0]), (s1, 1));
        assert!(b.get_newer(seq).is_none());
        b.update(frame(2));
        b.update(frame(3));
        let (seq, f) = b.get_newer(seq).unwrap();
        assert_eq!((seq, f.counts[0]), (3, 3));
    }
}
