//! Cancellable fire-once timers.
//!
//! The reminder scheduler only talks to [`TimerQueue`]; production wires in
//! [`TokioTimerQueue`], tests drive a manual queue instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::debug;

pub type TimerJob = BoxFuture<'static, ()>;

pub trait TimerQueue: Send + Sync {
    /// Run `job` once after `delay`. Scheduling an existing key replaces the
    /// pending timer.
    fn schedule(&self, key: String, delay: Duration, job: TimerJob);

    /// Drop a pending timer. Returns `false` if nothing was pending.
    fn cancel(&self, key: &str) -> bool;

    fn is_scheduled(&self, key: &str) -> bool;
}

struct Armed {
    generation: u64,
    handle: JoinHandle<()>,
}

type ArmedMap = Arc<Mutex<HashMap<String, Armed>>>;

fn lock(map: &ArmedMap) -> MutexGuard<'_, HashMap<String, Armed>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One spawned tokio task per timer. Must be used inside a tokio runtime.
#[derive(Default)]
pub struct TokioTimerQueue {
    armed: ArmedMap,
    generation: AtomicU64,
}

impl TokioTimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.armed).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimerQueue for TokioTimerQueue {
    fn schedule(&self, key: String, delay: Duration, job: TimerJob) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let armed = Arc::clone(&self.armed);
        let task_key = key.clone();

        // The map stays locked until the entry is inserted, so the task
        // cannot look itself up before it is registered.
        let mut map = lock(&self.armed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = lock(&armed);
                match map.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&task_key);
                    }
                    _ => return,
                }
            }
            debug!(key = %task_key, "Timer fired");
            job.await;
        });
        if let Some(previous) = map.insert(key, Armed { generation, handle }) {
            previous.handle.abort();
        }
    }

    fn cancel(&self, key: &str) -> bool {
        match lock(&self.armed).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                debug!(key, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    fn is_scheduled(&self, key: &str) -> bool {
        lock(&self.armed).contains_key(key)
    }
}

impl Drop for TokioTimerQueue {
    fn drop(&mut self) {
        for (_, entry) in lock(&self.armed).drain() {
            entry.handle.abort();
        }
    }
}
