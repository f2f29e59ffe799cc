//! In-memory FIFO of encoded tasks awaiting an idle worker.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Shared, unbounded FIFO of task frames.
///
/// Clones share the same queue. Producers append with [`TaskQueue::push`];
/// outbound connections take frames with [`TaskQueue::pop_timeout`] and hand
/// undeliverable frames back with [`TaskQueue::requeue`].
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    inner: Arc<QueueState>,
}

#[derive(Debug, Default)]
struct QueueState {
    frames: Mutex<VecDeque<Vec<u8>>>,
    available: Condvar,
}

impl TaskQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a frame to the tail of the queue.
    pub fn push(&self, frame: Vec<u8>) {
        self.lock().push_back(frame);
        self.inner.available.notify_one();
    }

    /// Returns a frame to the head of the queue after a failed delivery.
    pub fn requeue(&self, frame: Vec<u8>) {
        self.lock().push_front(frame);
        self.inner.available.notify_one();
    }

    /// Takes the oldest frame, waiting up to `timeout` for one to arrive.
    #[must_use]
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut frames = self.lock();
        loop {
            if let Some(frame) = frames.pop_front() {
                return Some(frame);
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .inner
                .available
                .wait_timeout(frames, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            frames = guard;
        }
    }

    /// Number of frames waiting for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no frames are waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        // Frames are plain bytes; a panicking holder cannot leave them torn.
        self.inner
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::rstest;

    use super::*;

    #[rstest]
    fn frames_leave_in_arrival_order() {
        let queue = TaskQueue::new();
        queue.push(b"first".to_vec());
        queue.push(b"second".to_vec());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(b"first".to_vec()));
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(b"second".to_vec()));
        assert!(queue.is_empty());
    }

    #[rstest]
    fn requeued_frames_jump_the_line() {
        let queue = TaskQueue::new();
        queue.push(b"later".to_vec());
        queue.requeue(b"retry".to_vec());
        assert_eq!(queue.pop_timeout(Duration::ZERO), Some(b"retry".to_vec()));
    }

    #[rstest]
    fn empty_queue_times_out() {
        let queue = TaskQueue::new();
        let started = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(30)), None);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[rstest]
    fn waiting_consumer_wakes_on_push() {
        let queue = TaskQueue::new();
        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(b"wake".to_vec());
        assert_eq!(
            consumer.join().expect("consumer thread"),
            Some(b"wake".to_vec())
        );
    }
}
