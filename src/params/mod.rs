//! Controlled camera parameters and their shared state
//!
//! This module holds the two device controls `camsync` keeps in sync and the
//! synchronized store that both the background scheduler and user-triggered
//! apply requests read and update.
//!
//! # Overview
//!
//! - `ControlledParameter`: the two controls (exposure, frame rate), their bounds and
//!   their `v4l2-ctl` control names
//! - `ParameterState`: target value, last confirmed value, last outcome and timestamp
//! - `ParameterStore`: mutex-guarded per-parameter records plus a per-parameter
//!   apply gate that keeps at most one external invocation in flight per control
//!
//! # Invariants
//!
//! - A target value always lies inside its parameter's bound. `set_target` rejects
//!   anything else with `CamSyncError::OutOfRange` and leaves the target untouched.
//! - The last applied value only moves when a successful invocation is recorded.
//!
//! # Example Usage
//!
//! ```
//! use camsync::params::{ApplyOutcome, ControlledParameter, ParameterStore};
//! use std::time::Instant;
//!
//! let store = ParameterStore::seeded(800, 60);
//! store.set_target(ControlledParameter::Exposure, 7000)?;
//! assert!(store.needs_reapply(ControlledParameter::Exposure));
//!
//! store.record_apply_result(
//!     ControlledParameter::Exposure,
//!     7000,
//!     ApplyOutcome::Success,
//!     Instant::now(),
//! );
//! assert!(!store.needs_reapply(ControlledParameter::Exposure));
//! # Ok::<(), camsync::CamSyncError>(())
//! ```

pub mod store;

pub use store::{
    ApplyOutcome, ControlSnapshot, ControlledParameter, ParameterSnapshot, ParameterState,
    ParameterStore,
};
