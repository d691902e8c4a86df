//! Parameter store implementation
//!
//! Each parameter owns two locks: `state` guards the record itself and is only held
//! for short read-modify-write sections, `apply_gate` is held for the whole duration
//! of an external invocation for that parameter.

use crate::error::{CamSyncError, Result};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// A camera control kept in sync by `camsync`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlledParameter {
    /// Exposure time in microseconds
    Exposure,
    /// Frame rate in frames per second
    FrameRate,
}

impl ControlledParameter {
    /// All parameters in the fixed order the scheduler visits them
    pub const ALL: [Self; 2] = [Self::Exposure, Self::FrameRate];

    /// Inclusive `[min, max]` bound accepted by the device
    pub const fn bounds(self) -> (i64, i64) {
        match self {
            Self::Exposure => (1, 65523),
            Self::FrameRate => (5, 120),
        }
    }

    /// Value used when the command line does not supply one
    pub const fn default_value(self) -> i64 {
        match self {
            Self::Exposure => 800,
            Self::FrameRate => 60,
        }
    }

    /// Control name passed to `--set-ctrl`
    pub const fn control_name(self) -> &'static str {
        match self {
            Self::Exposure => "exposure",
            Self::FrameRate => "frame_rate",
        }
    }

    /// Human-readable label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Exposure => "Exposure",
            Self::FrameRate => "Frame rate",
        }
    }

    /// Display unit
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Exposure => "us",
            Self::FrameRate => "fps",
        }
    }

    /// Whether `value` lies inside the parameter's bound
    pub const fn contains(self, value: i64) -> bool {
        let (min, max) = self.bounds();
        value >= min && value <= max
    }

    /// Clamp `value` into the parameter's bound
    pub fn clamp(self, value: i64) -> i64 {
        let (min, max) = self.bounds();
        value.clamp(min, max)
    }

    const fn index(self) -> usize {
        match self {
            Self::Exposure => 0,
            Self::FrameRate => 1,
        }
    }
}

impl fmt::Display for ControlledParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exposure => f.write_str("exposure"),
            Self::FrameRate => f.write_str("frame rate"),
        }
    }
}

/// Outcome of the most recent apply attempt for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// No invocation has completed yet
    #[default]
    NeverApplied,
    /// The control tool exited with status 0
    Success,
    /// The control tool failed, timed out or could not be started
    Failure,
}

/// Per-parameter synchronization record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterState {
    /// Value the device should be running with
    pub target: i64,
    /// Last value confirmed by a successful invocation
    pub last_applied: Option<i64>,
    /// Outcome of the last recorded invocation
    pub last_outcome: ApplyOutcome,
    /// When the last invocation was recorded
    pub last_applied_at: Option<Instant>,
}

impl ParameterState {
    fn new(target: i64) -> Self {
        Self {
            target,
            last_applied: None,
            last_outcome: ApplyOutcome::NeverApplied,
            last_applied_at: None,
        }
    }

    /// True until the target has been confirmed by a successful invocation
    pub fn needs_reapply(&self) -> bool {
        self.last_outcome != ApplyOutcome::Success || self.last_applied != Some(self.target)
    }

    /// True when the last success is older than `max_age`
    pub fn is_stale(&self, max_age: Duration, now: Instant) -> bool {
        match (self.last_outcome, self.last_applied_at) {
            (ApplyOutcome::Success, Some(at)) => now.saturating_duration_since(at) >= max_age,
            _ => false,
        }
    }
}

struct ParameterSlot {
    state: Mutex<ParameterState>,
    apply_gate: Mutex<()>,
}

impl ParameterSlot {
    fn new(target: i64) -> Self {
        Self {
            state: Mutex::new(ParameterState::new(target)),
            apply_gate: Mutex::new(()),
        }
    }
}

/// Synchronized store for the controlled parameters
///
/// Shared between the scheduler thread and user-triggered apply requests behind an
/// `Arc`. Every accessor takes the parameter's lock for the duration of one
/// read-modify-write, so a user apply and a scheduler tick can never leave the
/// outcome inconsistent with the recorded value.
pub struct ParameterStore {
    slots: [ParameterSlot; 2],
}

impl ParameterStore {
    /// Create a store, rejecting initial values outside their bounds
    pub fn new(exposure: i64, frame_rate: i64) -> Result<Self> {
        for (param, value) in [
            (ControlledParameter::Exposure, exposure),
            (ControlledParameter::FrameRate, frame_rate),
        ] {
            check_bounds(param, value)?;
        }

        Ok(Self {
            slots: [ParameterSlot::new(exposure), ParameterSlot::new(frame_rate)],
        })
    }

    /// Create a store from command-line seeds, clamping them into their bounds
    pub fn seeded(exposure: i64, frame_rate: i64) -> Self {
        use tracing::warn;

        let mut seeds = [exposure, frame_rate];
        for (param, seed) in ControlledParameter::ALL.into_iter().zip(seeds.iter_mut()) {
            let clamped = param.clamp(*seed);
            if clamped != *seed {
                warn!(
                    "Initial {} {} is outside {:?}, clamped to {}",
                    param,
                    seed,
                    param.bounds(),
                    clamped
                );
                *seed = clamped;
            }
        }

        Self {
            slots: [ParameterSlot::new(seeds[0]), ParameterSlot::new(seeds[1])],
        }
    }

    fn slot(&self, param: ControlledParameter) -> &ParameterSlot {
        &self.slots[param.index()]
    }

    /// Validate and store a new target value, returning the accepted value
    pub fn set_target(&self, param: ControlledParameter, value: i64) -> Result<i64> {
        use tracing::debug;

        check_bounds(param, value)?;

        let mut state = self.slot(param).state.lock();
        if state.target != value {
            debug!("Target {} changed: {} -> {}", param, state.target, value);
        }
        state.target = value;
        Ok(value)
    }

    /// Record the outcome of an invocation that tried to apply `value`
    ///
    /// The last applied value only changes when `outcome` is `Success`.
    pub fn record_apply_result(
        &self,
        param: ControlledParameter,
        value: i64,
        outcome: ApplyOutcome,
        at: Instant,
    ) {
        let mut state = self.slot(param).state.lock();
        if outcome == ApplyOutcome::Success {
            state.last_applied = Some(value);
        }
        state.last_outcome = outcome;
        state.last_applied_at = Some(at);
    }

    /// Whether the parameter still has to be pushed to the device
    pub fn needs_reapply(&self, param: ControlledParameter) -> bool {
        self.slot(param).state.lock().needs_reapply()
    }

    /// Whether the parameter's last success is older than `max_age`
    pub fn is_stale(&self, param: ControlledParameter, max_age: Duration, now: Instant) -> bool {
        self.slot(param).state.lock().is_stale(max_age, now)
    }

    /// Target to push if the parameter needs an invocation, read under one lock
    ///
    /// With `stale_after` set, a confirmed value older than that age is returned too.
    pub fn pending_value(
        &self,
        param: ControlledParameter,
        stale_after: Option<Duration>,
        now: Instant,
    ) -> Option<i64> {
        let state = self.slot(param).state.lock();
        let stale = stale_after.is_some_and(|age| state.is_stale(age, now));
        (state.needs_reapply() || stale).then_some(state.target)
    }

    /// Current target value
    pub fn target(&self, param: ControlledParameter) -> i64 {
        self.slot(param).state.lock().target
    }

    /// Last value confirmed on the device
    pub fn last_applied(&self, param: ControlledParameter) -> Option<i64> {
        self.slot(param).state.lock().last_applied
    }

    /// Outcome of the last recorded invocation
    pub fn last_outcome(&self, param: ControlledParameter) -> ApplyOutcome {
        self.slot(param).state.lock().last_outcome
    }

    /// Copy of the full record for `param`
    pub fn state(&self, param: ControlledParameter) -> ParameterState {
        *self.slot(param).state.lock()
    }

    /// Acquire the parameter's apply gate
    ///
    /// Held for the whole external invocation so that at most one invocation per
    /// parameter is in flight. Callers must not hold it while waiting on the gate of
    /// the other parameter.
    pub fn apply_gate(&self, param: ControlledParameter) -> MutexGuard<'_, ()> {
        self.slot(param).apply_gate.lock()
    }

    /// Serializable view of both parameters for status displays
    pub fn snapshot(&self) -> ControlSnapshot {
        let now = Instant::now();
        let parameters = ControlledParameter::ALL.map(|param| {
            let state = self.state(param);
            ParameterSnapshot {
                parameter: param,
                target: state.target,
                last_applied: state.last_applied,
                last_outcome: state.last_outcome,
                last_applied_age_ms: state.last_applied_at.map(|at| {
                    u64::try_from(now.saturating_duration_since(at).as_millis())
                        .unwrap_or(u64::MAX)
                }),
                in_sync: !state.needs_reapply(),
            }
        });
        ControlSnapshot { parameters }
    }
}

fn check_bounds(param: ControlledParameter, value: i64) -> Result<()> {
    if param.contains(value) {
        return Ok(());
    }
    let (min, max) = param.bounds();
    Err(CamSyncError::OutOfRange {
        param,
        value,
        min,
        max,
    })
}

/// Point-in-time view of one parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSnapshot {
    /// Which parameter this is
    pub parameter: ControlledParameter,
    /// Requested value
    pub target: i64,
    /// Last confirmed value
    pub last_applied: Option<i64>,
    /// Outcome of the last invocation
    pub last_outcome: ApplyOutcome,
    /// Milliseconds since the last invocation was recorded
    pub last_applied_age_ms: Option<u64>,
    /// Whether the device is confirmed to run with the target
    pub in_sync: bool,
}

/// Point-in-time view of all parameters, in scheduler order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    /// Exposure first, frame rate second
    pub parameters: [ParameterSnapshot; 2],
}

impl ControlSnapshot {
    /// Snapshot entry for `param`
    pub fn get(&self, param: ControlledParameter) -> &ParameterSnapshot {
        &self.parameters[param.index()]
    }
}
