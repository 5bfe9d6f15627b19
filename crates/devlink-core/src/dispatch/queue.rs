// ── Work queue ──
//
// Keyed queue with the usual controller guarantees: a key sits in the queue
// at most once, and a key being processed is never handed to a second
// worker. Re-adding a key while it is processing parks it until `done`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::model::ObjectKey;

#[derive(Default)]
struct State {
    queue: VecDeque<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    delayed: usize,
    shutting_down: bool,
}

/// Returns whether the key went onto the queue and a waiter should wake.
fn enqueue(state: &mut State, key: ObjectKey) -> bool {
    if state.shutting_down || !state.dirty.insert(key.clone()) {
        return false;
    }
    if state.processing.contains(&key) {
        return false;
    }
    state.queue.push_back(key);
    true
}

#[derive(Clone, Default)]
pub struct WorkQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, key: ObjectKey) {
        let queued = enqueue(&mut self.lock(), key);
        if queued {
            self.notify.notify_one();
        }
    }

    /// Add `key` once `delay` has elapsed. The queue does not count as idle
    /// while the delay runs.
    pub fn add_after(&self, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        self.lock().delayed += 1;
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let queued = {
                let mut state = queue.lock();
                state.delayed = state.delayed.saturating_sub(1);
                enqueue(&mut state, key)
            };
            if queued {
                queue.notify.notify_one();
            }
        });
    }

    /// Wait for the next key. Returns `None` once the queue is shut down
    /// and drained.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark `key` as processed, re-queueing it if it was added meanwhile.
    pub fn done(&self, key: &ObjectKey) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the queue has no work now and none scheduled.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.queue.is_empty() && state.processing.is_empty() && state.delayed == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    #[tokio::test]
    async fn duplicate_adds_collapse() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
    }

    #[tokio::test]
    async fn processing_key_is_parked_until_done() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        let first = queue.get().await.unwrap();

        queue.add(key("a"));
        assert!(queue.is_empty());

        queue.done(&first);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[test]
    fn get_parks_until_a_key_arrives() {
        let queue = WorkQueue::new();
        let mut next = task::spawn(queue.get());
        assert_pending!(next.poll());

        queue.add(key("a"));
        assert!(next.is_woken());
        assert_ready_eq!(next.poll(), Some(key("a")));
    }

    #[tokio::test]
    async fn shutdown_releases_waiters() {
        let queue = WorkQueue::new();
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;
        queue.shutdown();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_delays_delivery() {
        let queue = WorkQueue::new();
        queue.add_after(key("a"), Duration::from_secs(5));
        tokio::task::yield_now().await;
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_delay_keeps_queue_busy() {
        let queue = WorkQueue::new();
        queue.add_after(key("a"), Duration::from_millis(50));
        assert!(queue.is_empty());
        assert!(!queue.is_idle());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let next = queue.get().await.unwrap();
        assert!(!queue.is_idle());
        queue.done(&next);
        assert!(queue.is_idle());
    }
}
