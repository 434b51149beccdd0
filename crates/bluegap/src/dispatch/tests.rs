//! Unit tests for the dispatcher and its timers

use super::*;
use crate::error::GapError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Counter {
    value: u32,
    log: Vec<&'static str>,
    timers: Timers<Counter>,
}

impl TimerHost for Counter {
    fn timers(&mut self) -> &mut Timers<Self> {
        &mut self.timers
    }
}

fn start(capacity: usize) -> Dispatcher<Counter> {
    Dispatcher::start(Counter::default(), capacity, Duration::from_secs(2)).unwrap()
}

#[test]
fn test_blocking_submission_returns_task_result() {
    let dispatcher = start(8);
    let handle = dispatcher.handle();

    let first = handle
        .submit_blocking(|ctx: &mut Counter| {
            ctx.value += 5;
            ctx.value
        })
        .unwrap();
    let second = handle
        .submit_blocking(|ctx: &mut Counter| {
            ctx.value *= 2;
            ctx.value
        })
        .unwrap();

    assert_eq!(first, 5);
    assert_eq!(second, 10);
}

#[test]
fn test_async_tasks_run_in_fifo_order() {
    let dispatcher = start(8);
    let handle = dispatcher.handle();

    handle.submit_async(|ctx: &mut Counter| ctx.log.push("a")).unwrap();
    handle.submit_async(|ctx: &mut Counter| ctx.log.push("b")).unwrap();
    handle.submit_async(|ctx: &mut Counter| ctx.log.push("c")).unwrap();

    let log = handle.submit_blocking(|ctx: &mut Counter| ctx.log.clone()).unwrap();
    assert_eq!(log, vec!["a", "b", "c"]);
}

#[test]
fn test_cleanup_runs_after_task_even_when_task_panics() {
    let dispatcher = start(8);
    let handle = dispatcher.handle();
    let cleanups = Arc::new(AtomicUsize::new(0));

    let counter = cleanups.clone();
    handle
        .submit_async_with_cleanup(
            |ctx: &mut Counter| ctx.value += 1,
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

    let counter = cleanups.clone();
    handle
        .submit_async_with_cleanup(
            |_ctx: &mut Counter| panic!("task failure"),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

    // The worker survives the panic and keeps serving.
    let value = handle.submit_blocking(|ctx: &mut Counter| ctx.value).unwrap();
    assert_eq!(value, 1);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}

#[test]
fn test_full_queue_reports_resource_exhausted() {
    let dispatcher = start(1);
    let handle = dispatcher.handle();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (started_tx, started_rx) = mpsc::channel::<()>();

    // Park the worker so the queue fills up.
    handle
        .submit_async(move |_ctx: &mut Counter| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        })
        .unwrap();
    started_rx.recv().unwrap();

    handle.submit_async(|ctx: &mut Counter| ctx.value += 1).unwrap();
    let overflow = handle.submit_async(|ctx: &mut Counter| ctx.value += 1);
    assert_eq!(overflow, Err(GapError::ResourceExhausted));

    release_tx.send(()).unwrap();
    let value = handle.submit_blocking(|ctx: &mut Counter| ctx.value).unwrap();
    assert_eq!(value, 1);
}

#[test]
fn test_blocking_submission_times_out() {
    let dispatcher =
        Dispatcher::start(Counter::default(), 4, Duration::from_millis(50)).unwrap();
    let handle = dispatcher.handle();

    let result = handle.submit_blocking(|_ctx: &mut Counter| {
        thread::sleep(Duration::from_millis(300));
    });
    assert_eq!(result, Err(GapError::Timeout));
}

#[test]
fn test_blocking_submission_from_worker_is_refused() {
    let dispatcher = start(4);
    let handle = dispatcher.handle().clone();
    let inner = handle.clone();

    let nested = handle
        .submit_blocking(move |_ctx: &mut Counter| inner.submit_blocking(|ctx: &mut Counter| ctx.value))
        .unwrap();
    assert_eq!(nested, Err(GapError::WaitFailed));
}

#[test]
fn test_submission_after_shutdown_fails() {
    let mut dispatcher = start(4);
    let handle = dispatcher.handle().clone();
    dispatcher.shutdown();

    assert_eq!(
        handle.submit_async(|ctx: &mut Counter| ctx.value += 1),
        Err(GapError::Stopped)
    );
}

#[test]
fn test_timer_fires_on_worker() {
    let dispatcher = start(4);
    let handle = dispatcher.handle();
    let (fired_tx, fired_rx) = mpsc::channel();

    handle
        .submit_blocking(move |ctx: &mut Counter| {
            ctx.timers.set(Duration::from_millis(20), move |ctx: &mut Counter| {
                ctx.value = 42;
                fired_tx.send(()).unwrap();
            });
        })
        .unwrap();

    fired_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let value = handle.submit_blocking(|ctx: &mut Counter| ctx.value).unwrap();
    assert_eq!(value, 42);
}

#[test]
fn test_cancelled_timer_never_fires() {
    let mut ctx = Counter::default();
    let id = ctx.timers.set(Duration::ZERO, |ctx: &mut Counter| ctx.value = 1);
    assert!(ctx.timers.is_armed(id));
    assert!(ctx.timers.cancel(id));
    assert!(!ctx.timers.cancel(id));

    let ran = run_expired(&mut ctx, Instant::now() + Duration::from_secs(1));
    assert_eq!(ran, 0);
    assert_eq!(ctx.value, 0);
}

#[test]
fn test_timers_run_in_deadline_order() {
    let mut ctx = Counter::default();
    ctx.timers.set(Duration::from_secs(60), |ctx: &mut Counter| ctx.log.push("late"));
    ctx.timers.set(Duration::from_millis(10), |ctx: &mut Counter| ctx.log.push("early"));

    // Only the first one is due.
    let ran = run_expired(&mut ctx, Instant::now() + Duration::from_secs(1));
    assert_eq!(ran, 1);
    assert_eq!(ctx.log, vec!["early"]);

    run_expired(&mut ctx, Instant::now() + Duration::from_secs(120));
    assert_eq!(ctx.log, vec!["early", "late"]);
    assert!(ctx.timers.is_empty());
}
