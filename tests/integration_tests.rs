//! Integration tests for `camsync`
//!
//! Drives the store, scheduler and apply handler together through the public API,
//! with a scripted runner and with a real subprocess standing in for `v4l2-ctl`.

#![allow(clippy::unwrap_used)]

use camsync::{
    CamSyncError,
    controller::ApplyRequestHandler,
    device::{CommandError, CommandOutput, DeviceCommandRunner, V4l2CtlRunner},
    error::get_user_friendly_error,
    params::{ApplyOutcome, ControlledParameter, ParameterStore},
    scheduler::{SchedulerState, SyncContext, SyncEvent, SyncScheduler},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use ControlledParameter::{Exposure, FrameRate};

/// Runner answering from a queue of results per parameter, succeeding once empty
#[derive(Default)]
struct QueuedRunner {
    queued: Mutex<HashMap<ControlledParameter, Vec<Result<(), CommandError>>>>,
    calls: Mutex<Vec<(u32, ControlledParameter, i64)>>,
}

impl QueuedRunner {
    fn push(&self, param: ControlledParameter, result: Result<(), CommandError>) {
        self.queued.lock().entry(param).or_default().push(result);
    }

    fn calls(&self) -> Vec<(u32, ControlledParameter, i64)> {
        self.calls.lock().clone()
    }
}

impl DeviceCommandRunner for QueuedRunner {
    fn apply(
        &self,
        device_index: u32,
        param: ControlledParameter,
        value: i64,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().push((device_index, param, value));
        let next = self
            .queued
            .lock()
            .get_mut(&param)
            .filter(|queue| !queue.is_empty())
            .map(|queue| queue.remove(0));
        next.unwrap_or(Ok(())).map(|()| CommandOutput::default())
    }
}

fn timed_out() -> CommandError {
    CommandError::TimedOut {
        after: Duration::from_secs(2),
    }
}

fn setup(
    runner: &Arc<QueuedRunner>,
) -> (
    Arc<ParameterStore>,
    ApplyRequestHandler,
    SyncScheduler,
    mpsc::Receiver<SyncEvent>,
) {
    let store = Arc::new(ParameterStore::seeded(800, 60));
    let (tx, rx) = mpsc::sync_channel(64);
    let ctx = SyncContext::new(Arc::clone(&store), runner.clone(), 0).with_events(tx);
    let handler = ApplyRequestHandler::new(ctx.clone());
    let scheduler = SyncScheduler::new(ctx, Duration::from_millis(20));
    (store, handler, scheduler, rx)
}

/// Startup applies exposure, then frame rate, then goes quiet
#[test]
fn test_startup_sync_then_idle() {
    let runner = Arc::new(QueuedRunner::default());
    let (store, _handler, scheduler, _rx) = setup(&runner);

    scheduler.tick();
    assert_eq!(runner.calls(), vec![(0, Exposure, 800), (0, FrameRate, 60)]);
    assert_eq!(store.last_applied(Exposure), Some(800));
    assert_eq!(store.last_applied(FrameRate), Some(60));

    for _ in 0..5 {
        assert!(scheduler.tick().attempts.is_empty());
    }
    assert_eq!(runner.calls().len(), 2);
}

/// Out-of-range user input is rejected and the previous target stays in force
#[test]
fn test_exposure_request_then_out_of_range_request() {
    let runner = Arc::new(QueuedRunner::default());
    let (store, handler, scheduler, _rx) = setup(&runner);
    scheduler.tick();

    assert_eq!(handler.apply_now(Exposure, 7000).unwrap(), ApplyOutcome::Success);
    assert_eq!(store.last_applied(Exposure), Some(7000));

    let err = handler.apply_now(Exposure, 70000).unwrap_err();
    assert!(matches!(err, CamSyncError::OutOfRange { value: 70000, .. }));
    assert!(get_user_friendly_error(&err).contains("65523"));

    assert_eq!(store.target(Exposure), 7000);
    assert_eq!(store.last_applied(Exposure), Some(7000));
    assert!(!runner.calls().contains(&(0, Exposure, 70000)));
}

/// A frame-rate request that times out is retried on later ticks until it sticks
#[test]
fn test_frame_rate_timeout_retried_until_confirmed() {
    let runner = Arc::new(QueuedRunner::default());
    let (store, handler, scheduler, rx) = setup(&runner);
    scheduler.tick();

    runner.push(FrameRate, Err(timed_out()));
    runner.push(FrameRate, Err(timed_out()));
    runner.push(FrameRate, Err(timed_out()));

    assert_eq!(handler.apply_now(FrameRate, 30).unwrap(), ApplyOutcome::Failure);
    assert_eq!(store.last_applied(FrameRate), Some(60));

    scheduler.tick();
    scheduler.tick();
    assert!(store.needs_reapply(FrameRate));

    let report = scheduler.tick();
    assert_eq!(report.invoked(), vec![FrameRate]);
    assert_eq!(store.last_applied(FrameRate), Some(30));
    assert!(!store.needs_reapply(FrameRate));

    // Exposure was untouched by the frame-rate failures
    assert_eq!(
        runner.calls().iter().filter(|(_, p, _)| *p == Exposure).count(),
        1
    );

    let failures = rx
        .try_iter()
        .filter(|e| matches!(e, SyncEvent::Failed { param: FrameRate, value: 30, .. }))
        .count();
    assert_eq!(failures, 3);
}

/// A failed exposure does not hold back frame rate in the same tick
#[test]
fn test_failure_isolated_per_parameter() {
    let runner = Arc::new(QueuedRunner::default());
    runner.push(Exposure, Err(CommandError::Io(std::io::Error::other("boom"))));
    let (store, _handler, scheduler, _rx) = setup(&runner);

    let report = scheduler.tick();
    assert_eq!(report.failures(), 1);
    assert_eq!(store.last_outcome(Exposure), ApplyOutcome::Failure);
    assert_eq!(store.last_outcome(FrameRate), ApplyOutcome::Success);
}

/// Losing the device suspends the background loop until resumed
#[test]
fn test_device_loss_suspends_background_sync() {
    let runner = Arc::new(QueuedRunner::default());
    runner.push(Exposure, Err(CommandError::DeviceUnavailable { index: 0 }));
    let (store, _handler, scheduler, rx) = setup(&runner);

    scheduler.tick();
    assert!(scheduler.is_suspended());
    assert!(
        rx.try_iter()
            .any(|e| e == SyncEvent::DeviceUnavailable { index: 0 })
    );

    let calls = runner.calls().len();
    assert!(scheduler.tick().attempts.is_empty());
    assert_eq!(runner.calls().len(), calls);

    scheduler.resume();
    scheduler.tick();
    assert_eq!(store.last_applied(Exposure), Some(800));
    assert_eq!(store.last_applied(FrameRate), Some(60));
}

/// The background thread syncs on start and picks up new targets
#[test]
fn test_running_scheduler_lifecycle() {
    let runner = Arc::new(QueuedRunner::default());
    let (store, handler, scheduler, _rx) = setup(&runner);

    let handle = scheduler.start().unwrap();
    wait_for(|| store.last_applied(FrameRate) == Some(60));

    handler.set_target(Exposure, 12000).unwrap();
    wait_for(|| store.last_applied(Exposure) == Some(12000));

    handle.stop();
    let calls = runner.calls().len();
    thread::sleep(Duration::from_millis(60));
    assert_eq!(runner.calls().len(), calls);
}

#[test]
fn test_scheduler_starts_idle() {
    let runner = Arc::new(QueuedRunner::default());
    let (_store, _handler, scheduler, _rx) = setup(&runner);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
    scheduler.tick();
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}

fn wait_for(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(5));
    }
}

/// End to end through a real child process that records its arguments
#[cfg(unix)]
#[test]
fn test_real_subprocess_receives_v4l2_ctl_arguments() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let dev_root = dir.path().join("dev");
    std::fs::create_dir(&dev_root).unwrap();
    std::fs::write(dev_root.join("video3"), "").unwrap();

    let record = dir.path().join("calls.txt");
    let tool = dir.path().join("fake-v4l2-ctl");
    std::fs::write(
        &tool,
        format!("#!/bin/sh\necho \"$@\" >> '{}'\n", record.display()),
    )
    .unwrap();
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

    let runner = Arc::new(
        V4l2CtlRunner::new(&tool, Duration::from_secs(5)).with_device_root(&dev_root),
    );
    let store = Arc::new(ParameterStore::seeded(800, 60));
    let ctx = SyncContext::new(Arc::clone(&store), runner, 3);
    let handler = ApplyRequestHandler::new(ctx.clone());
    let scheduler = SyncScheduler::new(ctx, Duration::from_millis(20));

    scheduler.tick();
    assert_eq!(handler.apply_now(FrameRate, 90).unwrap(), ApplyOutcome::Success);

    let dev = dev_root.join("video3");
    let expected = [
        format!("--device {} --set-ctrl exposure=800", dev.display()),
        format!("--device {} --set-ctrl frame_rate=60", dev.display()),
        format!("--device {} --set-ctrl frame_rate=90", dev.display()),
    ];
    let recorded = std::fs::read_to_string(&record).unwrap();
    assert_eq!(recorded.lines().collect::<Vec<_>>(), expected);
}

/// A missing device node is reported without spawning the tool
#[test]
fn test_missing_device_node_surfaces_from_apply() {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(
        V4l2CtlRunner::new("/nonexistent/v4l2-ctl", Duration::from_secs(1))
            .with_device_root(dir.path()),
    );
    let store = Arc::new(ParameterStore::seeded(800, 60));
    let handler = ApplyRequestHandler::new(SyncContext::new(store, runner, 7));

    let err = handler.apply_now(Exposure, 1000).unwrap_err();
    assert!(matches!(err, CamSyncError::DeviceUnavailable { index: 7 }));
}
