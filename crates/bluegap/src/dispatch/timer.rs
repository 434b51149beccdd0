//! Cancellable one-shot timers that run on the dispatcher worker
//!
//! A timer is just a task with a deadline. The worker asks for the nearest
//! deadline to bound its queue wait and runs expired tasks in deadline order,
//! so a timer callback has the same exclusive access to the context as any
//! other task.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Handle of an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Work run when a timer expires
pub type TimerTask<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Context types that own a timer set
pub trait TimerHost: Sized {
    fn timers(&mut self) -> &mut Timers<Self>;
}

/// Pending timers of one context
pub struct Timers<C> {
    next_id: u64,
    queue: BTreeMap<(Instant, TimerId), TimerTask<C>>,
    deadlines: HashMap<TimerId, Instant>,
}

impl<C> Default for Timers<C> {
    fn default() -> Self {
        Self {
            next_id: 1,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }
}

impl<C> fmt::Debug for Timers<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("armed", &self.deadlines.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

impl<C> Timers<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that runs `task` after `delay`
    pub fn set<F>(&mut self, delay: Duration, task: F) -> TimerId
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let deadline = Instant::now() + delay;
        self.queue.insert((deadline, id), Box::new(task));
        self.deadlines.insert(id, deadline);
        id
    }

    /// Disarm a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer that is due at `now`
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerTask<C>> {
        let key = *self.queue.keys().next()?;
        if key.0 > now {
            return None;
        }
        self.deadlines.remove(&key.1);
        self.queue.remove(&key)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

/// Run every timer of `ctx` that is due at `now`, including timers armed by
/// the tasks being run if they are due as well. Returns how many ran.
pub fn run_expired<C: TimerHost>(ctx: &mut C, now: Instant) -> usize {
    let mut ran = 0;
    while let Some(task) = ctx.timers().pop_expired(now) {
        task(ctx);
        ran += 1;
    }
    ran
}
