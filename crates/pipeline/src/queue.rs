//! FIFO work queue with completion tracking and stop markers
//!
//! Every `put` and `put_stop` adds one unfinished entry; every `take` must be
//! matched by exactly one `ack`. `join` resolves once nothing is unfinished.
//! A requeue is a `put` of the same task followed by the `ack` of the take
//! that produced it, so it leaves the unfinished count unchanged.
//!
//! Halting: once `halt()` is called, `take` hands out stop markers only and
//! leaves tasks where they are, and `join` also resolves as soon as no taken
//! entry is still waiting for its `ack`. Tasks parked this way remain in the
//! queue and can be collected with `drain_tasks`.

use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

/// A queue entry: either real work or a stop marker for one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<T> {
    Task(T),
    Stop,
}

#[derive(Debug)]
struct State<T> {
    entries: VecDeque<Entry<T>>,
    /// Entries put but not yet acknowledged (includes queued and taken)
    unfinished: usize,
    /// Entries taken but not yet acknowledged
    taken: usize,
    halted: bool,
}

impl<T> State<T> {
    fn pop_ready(&mut self) -> Option<Entry<T>> {
        if self.halted {
            let at = self.entries.iter().position(|e| matches!(e, Entry::Stop))?;
            self.entries.remove(at)
        } else {
            self.entries.pop_front()
        }
    }

    fn settled(&self) -> bool {
        self.unfinished == 0 || (self.halted && self.taken == 0)
    }
}

/// Unbounded FIFO shared by the run's workers.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    /// Signalled when an entry becomes takeable
    available: Notify,
    /// Signalled when `join` may be able to resolve
    settled: Notify,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                unfinished: 0,
                taken: 0,
                halted: false,
            }),
            available: Notify::new(),
            settled: Notify::new(),
        }
    }

    /// Append a task at the tail.
    pub async fn put(&self, task: T) {
        self.push(Entry::Task(task)).await;
    }

    /// Append a stop marker at the tail.
    pub async fn put_stop(&self) {
        self.push(Entry::Stop).await;
    }

    async fn push(&self, entry: Entry<T>) {
        {
            let mut state = self.state.lock().await;
            state.entries.push_back(entry);
            state.unfinished += 1;
        }
        self.available.notify_waiters();
    }

    /// Remove the next entry, waiting while none is available.
    ///
    /// While halted only stop markers are handed out.
    pub async fn take(&self) -> Entry<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(entry) = state.pop_ready() {
                    state.taken += 1;
                    return entry;
                }
            }

            notified.await;
        }
    }

    /// Acknowledge one previously taken entry as fully handled.
    ///
    /// Calls without a matching `take` are ignored.
    pub async fn ack(&self) {
        let settled = {
            let mut state = self.state.lock().await;
            if state.taken == 0 {
                return;
            }
            state.taken -= 1;
            state.unfinished -= 1;
            state.settled()
        };
        if settled {
            self.settled.notify_waiters();
        }
    }

    /// Wait until every entry is acknowledged, or the queue is halted and no
    /// taken entry is outstanding.
    pub async fn join(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.lock().await.settled() {
                return;
            }

            notified.await;
        }
    }

    /// Stop handing out tasks. Irreversible.
    pub async fn halt(&self) {
        let settled = {
            let mut state = self.state.lock().await;
            state.halted = true;
            state.settled()
        };
        // Wake takers so they re-evaluate against the halted view
        self.available.notify_waiters();
        if settled {
            self.settled.notify_waiters();
        }
    }

    /// Number of queued tasks, not counting stop markers or taken entries.
    pub async fn pending_tasks(&self) -> usize {
        let state = self.state.lock().await;
        state
            .entries
            .iter()
            .filter(|e| matches!(e, Entry::Task(_)))
            .count()
    }

    /// Remove and return every queued task in FIFO order. Stop markers are discarded.
    pub async fn drain_tasks(&self) -> Vec<T> {
        let mut state = self.state.lock().await;
        let drained: Vec<Entry<T>> = state.entries.drain(..).collect();
        state.unfinished -= drained.len();
        drained
            .into_iter()
            .filter_map(|e| match e {
                Entry::Task(t) => Some(t),
                Entry::Stop => None,
            })
            .collect()
    }
}
