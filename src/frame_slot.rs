//! Single-slot handoff between a camera thread and the pipeline thread.
//!
//! The producer never blocks: publishing replaces a frame nobody picked up
//! yet. The consumer always sees the newest frame.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug)]
struct SlotState<T> {
    frame: Option<T>,
    closed: bool,
    dropped: u64,
}

/// Drop-old, keep-latest frame slot
#[derive(Debug)]
pub struct LatestFrameSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Default for LatestFrameSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestFrameSlot<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                frame: None,
                closed: false,
                dropped: 0,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame`, replacing an unconsumed one.
    ///
    /// Returns `true` when a previous frame was dropped. Frames published
    /// after [`close`](Self::close) are discarded.
    pub fn publish(&self, frame: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        let dropped = state.frame.replace(frame).is_some();
        if dropped {
            state.dropped += 1;
            log::trace!("Frame slot overwrote an unconsumed frame");
        }
        drop(state);
        self.ready.notify_one();
        dropped
    }

    /// Take the pending frame without blocking
    pub fn take(&self) -> Option<T> {
        self.lock().frame.take()
    }

    /// Wait up to `timeout` for a frame.
    ///
    /// Returns `None` on timeout or once the slot is closed and empty.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let state = self.lock();
        let (mut state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.frame.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        state.frame.take()
    }

    /// Stop accepting frames and wake every waiter
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of frames overwritten before they were consumed
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.lock().dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_keeps_latest() {
        let slot = LatestFrameSlot::new();
        assert!(!slot.publish(1));
        assert!(slot.publish(2));
        assert!(slot.publish(3));
        assert_eq!(slot.take(), Some(3));
        assert_eq!(slot.take(), None);
        assert_eq!(slot.dropped_frames(), 2);
    }

    #[test]
    fn test_wait_timeout_empty() {
        let slot: LatestFrameSlot<u32> = LatestFrameSlot::new();
        assert_eq!(slot.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn test_wait_receives_from_other_thread() {
        let slot = Arc::new(LatestFrameSlot::new());
        let producer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.publish(42u32);
            })
        };
        assert_eq!(slot.wait_timeout(Duration::from_secs(5)), Some(42));
        producer.join().unwrap();
    }

    #[test]
    fn test_close_wakes_waiter() {
        let slot: Arc<LatestFrameSlot<u32>> = Arc::new(LatestFrameSlot::new());
        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait_timeout(Duration::from_secs(30)))
        };
        thread::sleep(Duration::from_millis(20));
        slot.close();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(slot.is_closed());
        assert!(!slot.publish(1));
        assert_eq!(slot.take(), None);
    }
}
