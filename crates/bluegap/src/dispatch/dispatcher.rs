//! Single-worker task dispatcher
//!
//! The worker thread owns the context value outright; the only way to touch it
//! is to send a task. Synchronous callers block on a bounded wait for the
//! task's result, event sources fire and forget.

use super::timer::TimerHost;
use crate::error::{GapError, GapResult};
use log::{debug, error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

type Task<C> = Box<dyn FnOnce(&mut C) + Send>;

/// Runs after a task whether or not the task completed normally
pub type Cleanup = Box<dyn FnOnce() + Send>;

enum Message<C> {
    Run {
        task: Task<C>,
        cleanup: Option<Cleanup>,
    },
    Shutdown,
}

/// Cloneable submission side of a [`Dispatcher`]
pub struct DispatcherHandle<C> {
    sender: SyncSender<Message<C>>,
    worker_id: ThreadId,
    timeout: Duration,
}

impl<C> Clone for DispatcherHandle<C> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            worker_id: self.worker_id,
            timeout: self.timeout,
        }
    }
}

impl<C: 'static> DispatcherHandle<C> {
    /// Run `task` on the worker and wait for its result.
    ///
    /// Fails with `Timeout` when the worker does not finish within the
    /// configured bound and with `WaitFailed` when the task never reports
    /// back (it panicked, or the call was made from the worker itself).
    pub fn submit_blocking<R, F>(&self, task: F) -> GapResult<R>
    where
        F: FnOnce(&mut C) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.on_worker() {
            warn!("Blocking submission from the dispatcher worker refused");
            return Err(GapError::WaitFailed);
        }

        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.enqueue(
            Box::new(move |ctx: &mut C| {
                // The caller may have timed out already.
                let _ = reply_tx.send(task(ctx));
            }),
            None,
        )?;

        match reply_rx.recv_timeout(self.timeout) {
            Ok(result) => Ok(result),
            Err(RecvTimeoutError::Timeout) => Err(GapError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(GapError::WaitFailed),
        }
    }

    /// Queue `task` and return immediately
    pub fn submit_async<F>(&self, task: F) -> GapResult<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.enqueue(Box::new(task), None)
    }

    /// Queue `task`; `cleanup` runs on the worker right after it, even if
    /// the task panics. If submission fails neither runs.
    pub fn submit_async_with_cleanup<F, G>(&self, task: F, cleanup: G) -> GapResult<()>
    where
        F: FnOnce(&mut C) + Send + 'static,
        G: FnOnce() + Send + 'static,
    {
        self.enqueue(Box::new(task), Some(Box::new(cleanup)))
    }

    /// True when called from the worker thread
    pub fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn enqueue(&self, task: Task<C>, cleanup: Option<Cleanup>) -> GapResult<()> {
        match self.sender.try_send(Message::Run { task, cleanup }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Dispatcher queue is full");
                Err(GapError::ResourceExhausted)
            }
            Err(TrySendError::Disconnected(_)) => Err(GapError::Stopped),
        }
    }
}

/// Owner of the worker thread
pub struct Dispatcher<C> {
    handle: DispatcherHandle<C>,
    worker: Option<JoinHandle<()>>,
}

impl<C: TimerHost + Send + 'static> Dispatcher<C> {
    /// Move `context` onto a new worker thread
    pub fn start(context: C, capacity: usize, timeout: Duration) -> GapResult<Self> {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let worker = thread::Builder::new()
            .name("gap-dispatcher".into())
            .spawn(move || run_worker(context, receiver))
            .map_err(|e| {
                error!("Failed to spawn dispatcher worker: {}", e);
                GapError::ResourceExhausted
            })?;

        let handle = DispatcherHandle {
            sender,
            worker_id: worker.thread().id(),
            timeout,
        };
        debug!("Dispatcher started");
        Ok(Self {
            handle,
            worker: Some(worker),
        })
    }

    pub fn handle(&self) -> &DispatcherHandle<C> {
        &self.handle
    }

    /// Stop the worker after the tasks already queued have run
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // A disconnected channel means the worker is already gone.
        let _ = self.handle.sender.send(Message::Shutdown);
        if self.handle.on_worker() {
            return;
        }
        if worker.join().is_err() {
            error!("Dispatcher worker terminated abnormally");
        }
        debug!("Dispatcher stopped");
    }
}

impl<C> Drop for Dispatcher<C> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.handle.sender.send(Message::Shutdown);
            if thread::current().id() != self.handle.worker_id {
                let _ = worker.join();
            }
        }
    }
}

struct CleanupGuard(Option<Cleanup>);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup();
        }
    }
}

fn run_guarded<C>(ctx: &mut C, task: impl FnOnce(&mut C)) {
    if panic::catch_unwind(AssertUnwindSafe(|| task(ctx))).is_err() {
        error!("Dispatcher task panicked; worker continues");
    }
}

fn run_worker<C: TimerHost>(mut ctx: C, receiver: Receiver<Message<C>>) {
    loop {
        let now = Instant::now();
        while let Some(timer) = ctx.timers().pop_expired(now) {
            run_guarded(&mut ctx, timer);
        }

        let message = match ctx.timers().next_deadline() {
            Some(deadline) => {
                let wait = deadline.saturating_duration_since(Instant::now());
                match receiver.recv_timeout(wait) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match receiver.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            Message::Run { task, cleanup } => {
                let _cleanup = CleanupGuard(cleanup);
                run_guarded(&mut ctx, task);
            }
            Message::Shutdown => break,
        }
    }
    debug!("Dispatcher worker exiting");
}
