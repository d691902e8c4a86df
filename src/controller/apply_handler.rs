//! Apply request handler implementation
//!
//! Handles explicit "apply" actions from the UI collaborator. A request is
//! validated, stored as the new target and pushed to the device immediately,
//! without waiting for the next scheduler tick.

use crate::device::CommandError;
use crate::error::{CamSyncError, Result};
use crate::params::{ApplyOutcome, ControlSnapshot, ControlledParameter};
use crate::scheduler::{ApplySource, SyncContext};

/// Immediate, one-shot apply path for user requests
///
/// Shares its `SyncContext` with the scheduler, so both take the same per-parameter
/// apply gate and record results the same way. Applying a value does not pause or
/// reset the scheduler's later re-assertions.
#[derive(Clone)]
pub struct ApplyRequestHandler {
    ctx: SyncContext,
}

impl ApplyRequestHandler {
    /// Create a handler for the context's device
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Device index requests are applied to
    pub fn device_index(&self) -> u32 {
        self.ctx.device_index()
    }

    /// Store `requested` as the new target and push it to the device now
    ///
    /// Returns `OutOfRange` without touching the device when `requested` lies
    /// outside the parameter's bound, and `DeviceUnavailable` when the device node
    /// is missing. Any other command failure is absorbed: it is recorded as
    /// `Failure`, returned as `Ok(ApplyOutcome::Failure)` and retried by the
    /// scheduler.
    ///
    /// Waits for an in-flight scheduler invocation of the same parameter before
    /// issuing its own. A success proves the device is back, so it also resumes a
    /// scheduler suspended after losing the device.
    pub fn apply_now(&self, param: ControlledParameter, requested: i64) -> Result<ApplyOutcome> {
        use tracing::info;

        let value = self.ctx.store().set_target(param, requested)?;
        info!(
            "Apply requested: {} = {} {}",
            param,
            value,
            param.unit()
        );

        let attempt = {
            let _gate = self.ctx.store().apply_gate(param);
            self.ctx.apply_locked(param, value, ApplySource::User)
        };

        match attempt.error {
            Some(err @ CommandError::DeviceUnavailable { .. }) => Err(CamSyncError::from(err)),
            _ => {
                if attempt.outcome == ApplyOutcome::Success {
                    self.ctx.resume();
                }
                Ok(attempt.outcome)
            }
        }
    }

    /// Store a new target without invoking the device
    ///
    /// The scheduler picks it up on its next tick.
    pub fn set_target(&self, param: ControlledParameter, value: i64) -> Result<i64> {
        self.ctx.store().set_target(param, value)
    }

    /// Current target value
    pub fn target(&self, param: ControlledParameter) -> i64 {
        self.ctx.store().target(param)
    }

    /// Last value confirmed on the device
    pub fn last_applied(&self, param: ControlledParameter) -> Option<i64> {
        self.ctx.store().last_applied(param)
    }

    /// Outcome of the last recorded invocation
    pub fn last_outcome(&self, param: ControlledParameter) -> ApplyOutcome {
        self.ctx.store().last_outcome(param)
    }

    /// Status of both parameters
    pub fn snapshot(&self) -> ControlSnapshot {
        self.ctx.store().snapshot()
    }
}
