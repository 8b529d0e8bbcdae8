//! Rate-limited work queue keyed by object.
//!
//! A key is held at most once in the queue and handed to at most one worker at
//! a time. Adding a key while it is being processed marks it dirty; it goes
//! back on the queue when the worker calls [`WorkQueue::done`].

use has_core::ObjectKey;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

#[derive(Default)]
struct State {
    queue: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
    shut_down: bool,
}

struct Inner {
    name: &'static str,
    state: Mutex<State>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

/// Work queue shared by the watchers that fill it and the workers that drain it.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

/// Exponential per-key backoff: `base * 2^failures`, capped at `max`.
pub fn backoff(failures: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}

impl WorkQueue {
    pub fn new(name: &'static str) -> Self {
        Self::with_backoff(name, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }

    pub fn with_backoff(name: &'static str, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                base_delay,
                max_delay,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, key: ObjectKey) {
        let mut state = self.state();
        if state.shut_down || state.queued.contains(&key) {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        state.queued.insert(key.clone());
        state.queue.push_back(key);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed.
    pub fn add_after(&self, key: ObjectKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add `key` after its backoff delay and count one more failure for it.
    pub fn add_rate_limited(&self, key: ObjectKey) -> Duration {
        let delay = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = backoff(*failures, self.inner.base_delay, self.inner.max_delay);
            *failures = failures.saturating_add(1);
            delay
        };
        debug!(queue = self.inner.name, key = %key, delay_ms = delay.as_millis() as u64, "Requeueing with backoff");
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of `key`.
    pub fn forget(&self, key: &ObjectKey) {
        self.state().failures.remove(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ObjectKey> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shut_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as no longer in flight.
    pub fn done(&self, key: &ObjectKey) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.remove(key) && !state.shut_down && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shut_down(&self) {
        self.state().shut_down = true;
        self.inner.notify.notify_waiters();
    }
}
