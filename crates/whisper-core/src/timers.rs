use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Arena of cancellable one-shot timers keyed by `K`.
///
/// Each armed timer gets a fresh generation number. When its deadline passes
/// the spawned task calls `fire(key, generation)`; the callee must then
/// [`claim`](Timers::claim) the entry under its own lock before acting. A
/// timer that was disarmed or re-armed in the meantime fails the claim, so
/// a stale fire is a no-op and every armed timer takes effect at most once.
pub(crate) struct Timers<K> {
    runtime: Handle,
    pending: HashMap<K, Pending>,
    next_generation: u64,
}

struct Pending {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

impl<K> Timers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            pending: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arm (or re-arm) the timer for `key`. Any pending timer for the same
    /// key is cancelled first. Returns the new generation.
    pub fn arm<F>(&mut self, key: K, delay: Duration, fire: F) -> u64
    where
        F: FnOnce(K, u64) + Send + 'static,
    {
        self.disarm(&key);

        self.next_generation += 1;
        let generation = self.next_generation;
        // Deadline is fixed now, not when the task is first polled.
        let deadline = Instant::now() + delay;

        let task_key = key.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fire(task_key, generation);
        });

        self.pending.insert(
            key,
            Pending {
                generation,
                deadline,
                task,
            },
        );
        generation
    }

    /// Take ownership of a fired timer. Returns false if the timer was
    /// cancelled or replaced after this generation was armed.
    pub fn claim(&mut self, key: &K, generation: u64) -> bool {
        match self.pending.get(key) {
            Some(p) if p.generation == generation => {
                self.pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Cancel a pending timer. Returns false if there was nothing to cancel.
    pub fn disarm(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(p) => {
                p.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer whose key matches. Returns how many were
    /// cancelled.
    pub fn disarm_where<P>(&mut self, mut pred: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let keys: Vec<K> = self.pending.keys().filter(|k| pred(k)).cloned().collect();
        for key in &keys {
            self.disarm(key);
        }
        keys.len()
    }

    pub fn is_armed(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.pending.get(key).map(|p| p.deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

impl<K> Drop for Timers<K> {
    fn drop(&mut self) {
        for (_, p) in self.pending.drain() {
            p.task.abort();
        }
    }
}
