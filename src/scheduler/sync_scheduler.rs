//! Periodic synchronization implementation
//!
//! One background thread wakes on a fixed period and re-asserts every parameter
//! whose target is not yet confirmed on the device. The sleep between ticks is a
//! `recv_timeout` on a stop channel, so stopping never waits for a full period.

use crate::error::Result;
use crate::params::{ApplyOutcome, ControlledParameter};
use crate::scheduler::context::{ApplyAttempt, ApplySource, SyncContext, SyncEvent};
use parking_lot::Mutex;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default period between ticks
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// What the scheduler is doing right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,
    /// An invocation for the parameter is in flight
    Applying(ControlledParameter),
}

/// Everything one tick did, in invocation order
#[derive(Debug, Default)]
pub struct TickReport {
    /// Invocations issued during the tick
    pub attempts: Vec<ApplyAttempt>,
    /// The tick was skipped because the scheduler is suspended
    pub skipped: bool,
}

impl TickReport {
    /// Parameters invoked, in order
    pub fn invoked(&self) -> Vec<ControlledParameter> {
        self.attempts.iter().map(|a| a.param).collect()
    }

    /// Number of failed invocations
    pub fn failures(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == ApplyOutcome::Failure)
            .count()
    }
}

/// Periodic re-assertion of parameter targets
pub struct SyncScheduler {
    ctx: SyncContext,
    interval: Duration,
    stale_after: Option<Duration>,
    state: Arc<Mutex<SchedulerState>>,
}

impl SyncScheduler {
    /// Create a scheduler ticking every `interval`
    pub fn new(ctx: SyncContext, interval: Duration) -> Self {
        Self {
            ctx,
            interval,
            stale_after: None,
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
        }
    }

    /// Also re-apply confirmed values older than `age`
    ///
    /// Counteracts devices that silently revert controls to their defaults.
    #[must_use]
    pub fn with_stale_after(mut self, age: Option<Duration>) -> Self {
        self.stale_after = age;
        self
    }

    /// Tick period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Current state
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Whether ticks are skipped after the device disappeared
    pub fn is_suspended(&self) -> bool {
        self.ctx.is_suspended()
    }

    /// Resume ticking after a suspension
    pub fn resume(&self) {
        self.ctx.resume();
    }

    /// Run one synchronization pass
    ///
    /// Visits the parameters in fixed order (exposure, then frame rate) and invokes
    /// the runner for each one that needs it. A failure for one parameter never
    /// prevents the next one from being invoked.
    pub fn tick(&self) -> TickReport {
        use tracing::{debug, error};

        if self.is_suspended() {
            debug!("Scheduler suspended, skipping tick");
            return TickReport {
                attempts: Vec::new(),
                skipped: true,
            };
        }

        let store = self.ctx.store();
        let mut attempts = Vec::new();

        for param in ControlledParameter::ALL {
            let _gate = store.apply_gate(param);

            let Some(value) = store.pending_value(param, self.stale_after, Instant::now()) else {
                continue;
            };

            *self.state.lock() = SchedulerState::Applying(param);
            let attempt = self.ctx.apply_locked(param, value, ApplySource::Scheduler);
            *self.state.lock() = SchedulerState::Idle;

            if attempt.is_device_unavailable() && self.ctx.suspend() {
                let index = self.ctx.device_index();
                error!(
                    "/dev/video{} is not available; background synchronization suspended \
                     until resumed",
                    index
                );
                self.ctx.events().notify(SyncEvent::DeviceUnavailable { index });
            }

            attempts.push(attempt);
        }

        TickReport {
            attempts,
            skipped: false,
        }
    }

    /// Start ticking on a background thread
    ///
    /// The first tick runs immediately, so initial values reach the device without
    /// waiting a full period.
    pub fn start(self) -> Result<SchedulerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let state = Arc::clone(&self.state);
        let ctx = self.ctx.clone();

        let thread = thread::Builder::new()
            .name("camsync-scheduler".to_string())
            .spawn(move || self.run(&stop_rx))?;

        Ok(SchedulerHandle {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            state,
            ctx,
        })
    }

    fn run(&self, stop_rx: &mpsc::Receiver<()>) {
        use std::sync::mpsc::RecvTimeoutError;
        use tracing::{debug, info};

        info!(
            "Sync scheduler started for /dev/video{} (interval {:?})",
            self.ctx.device_index(),
            self.interval
        );

        loop {
            let report = self.tick();
            if !report.attempts.is_empty() {
                debug!(
                    "Tick invoked {:?} with {} failure(s)",
                    report.invoked(),
                    report.failures()
                );
            }

            match stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("Sync scheduler stopped");
    }
}

/// Control handle for a running scheduler
///
/// Dropping the handle stops the loop at its next wake-up without waiting for it;
/// `stop` also joins the thread.
pub struct SchedulerHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    state: Arc<Mutex<SchedulerState>>,
    ctx: SyncContext,
}

impl SchedulerHandle {
    /// Current state of the scheduler
    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }

    /// Whether the scheduler suspended itself after losing the device
    pub fn is_suspended(&self) -> bool {
        self.ctx.is_suspended()
    }

    /// Resume ticking after a suspension
    pub fn resume(&self) {
        self.ctx.resume();
    }

    /// Stop the loop and wait for the thread to exit
    ///
    /// An invocation already in flight runs to completion (bounded by the command
    /// timeout) before the thread exits.
    pub fn stop(mut self) {
        use tracing::warn;

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("Sync scheduler thread panicked");
        }
    }
}
