//! Single-slot "new configuration available" signal.
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct State<T> {
    value: Option<T>,
    updated: bool,
}

/// Thread-safe holder for the latest configuration plus an "updated" flag.
///
/// The producer calls `set`; the consumer either blocks for the first value
/// or polls for changes without blocking.
#[derive(Debug)]
pub struct ConfigMailbox<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

impl<T> Default for ConfigMailbox<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                value: None,
                updated: false,
            }),
            cond: Condvar::new(),
        }
    }
}

impl<T: Clone> ConfigMailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new value and mark it as unread.
    pub fn set(&self, value: T) {
        let mut st = self.lock();
        st.value = Some(value);
        st.updated = true;
        drop(st);
        self.cond.notify_all();
    }

    /// Block until a first value exists; consumes the pending update.
    pub fn wait_for_initial(&self) -> T {
        let mut st = self.lock();
        loop {
            if let Some(v) = st.value.clone() {
                st.updated = false;
                return v;
            }
            st = self.cond.wait(st).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_for_initial`](Self::wait_for_initial) but gives up after `timeout`.
    pub fn wait_for_initial_timeout(&self, timeout: Duration) -> Option<T> {
        let st = self.lock();
        let (mut st, _) = self
            .cond
            .wait_timeout_while(st, timeout, |s| s.value.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        let v = st.value.clone()?;
        st.updated = false;
        Some(v)
    }

    /// A copy of the value if it changed since the last read, else `None`.
    pub fn get_if_updated(&self) -> Option<T> {
        let mut st = self.lock();
        if !st.updated {
            return None;
        }
        st.updated = false;
        st.value.clone()
    }

    /// Latest value regardless of the update flag.
    pub fn current(&self) -> Option<T> {
        self.lock().value.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn get_if_updated_reports_each_change_once() {
        let mb = ConfigMailbox::new();
        assert_eq!(mb.get_if_updated(), None);
        mb.set(1);
        assert_eq!(mb.get_if_updated(), Some(1));
        assert_eq!(mb.get_if_updated(), None);
        mb.set(2);
        mb.set(3);
        assert_eq!(mb.get_if_updated(), Some(3));
        assert_eq!(mb.current(), Some(3));
    }

    #[test]
    fn wait_for_initial_blocks_until_set() {
        let mb = Arc::new(ConfigMailbox::new());
        let producer = {
            let mb = Arc::clone(&mb);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                mb.set("exposure=50");
            })
        };
        assert_eq!(mb.wait_for_initial(), "exposure=50");
        // The initial value counts as consumed.
        assert_eq!(mb.get_if_updated(), None);
        producer.join().unwrap();
    }

    #[test]
    fn wait_for_initial_timeout_gives_up() {
        let mb: ConfigMailbox<u8> = ConfigMailbox::new();
        assert_eq!(mb.wait_for_initial_timeout(Duration::from_millis(10)), None);
    }
}
