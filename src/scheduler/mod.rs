//! Periodic synchronization module
//!
//! This module keeps the device's exposure and frame rate consistent with the
//! requested targets by re-applying them on a fixed period.
//!
//! # Overview
//!
//! The synchronization loop provides:
//! - **Background re-assertion** of unconfirmed targets at a configurable interval
//! - **Change detection** through `ParameterStore::needs_reapply`, so a converged
//!   parameter is not invoked again
//! - **Failure isolation**: a failing parameter never blocks the other one
//! - **Event notification** of applied and failed values for a UI collaborator
//!
//! # Architecture
//!
//! - `SyncScheduler`: background thread ticking on a fixed period
//! - `SchedulerHandle`: stop/resume control for the running thread
//! - `SyncContext`: invocation path shared with user-triggered apply requests
//! - `SyncEvent`: notifications sent over a bounded mpsc channel
//!
//! # Tick Algorithm
//!
//! For each parameter in fixed order (exposure, then frame rate):
//! 1. Take the parameter's apply gate (waits for a user apply in flight)
//! 2. Read the target if the parameter needs re-applying (or is stale)
//! 3. Invoke the runner and record `Success` or `Failure`
//! 4. Continue with the next parameter regardless of the outcome
//!
//! # Device Loss
//!
//! When the device node disappears the scheduler records the failure, emits one
//! `SyncEvent::DeviceUnavailable` and suspends itself. It does not retry until the
//! collaborator calls `resume` or a user apply succeeds.
//!
//! # Example Usage
//!
//! ```no_run
//! use camsync::device::V4l2CtlRunner;
//! use camsync::params::ParameterStore;
//! use camsync::scheduler::{SyncContext, SyncEvent, SyncScheduler};
//! use std::sync::{Arc, mpsc};
//! use std::time::Duration;
//!
//! let store = Arc::new(ParameterStore::seeded(800, 60));
//! let (tx, rx) = mpsc::sync_channel(32);
//! let ctx = SyncContext::new(store, Arc::new(V4l2CtlRunner::default()), 0).with_events(tx);
//!
//! let handle = SyncScheduler::new(ctx, Duration::from_secs(1)).start()?;
//!
//! if let Ok(SyncEvent::DeviceUnavailable { index }) = rx.recv() {
//!     println!("/dev/video{index} disappeared");
//! }
//! handle.stop();
//! # Ok::<(), camsync::CamSyncError>(())
//! ```

pub mod context;
pub mod sync_scheduler;

pub use context::{ApplyAttempt, ApplySource, EventSink, SyncContext, SyncEvent};
pub use sync_scheduler::{
    DEFAULT_SYNC_INTERVAL, SchedulerHandle, SchedulerState, SyncScheduler, TickReport,
};
