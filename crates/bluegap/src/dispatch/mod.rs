//! Task dispatcher
//!
//! Serializes all engine state mutation onto one worker thread. Engines never
//! lock; they are only ever entered through a task or a timer.

mod dispatcher;
mod timer;

#[cfg(test)]
mod tests;

pub use self::dispatcher::{Cleanup, Dispatcher, DispatcherHandle};
pub use self::timer::{run_expired, TimerHost, TimerId, TimerTask, Timers};
