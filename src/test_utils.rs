#![expect(
    clippy::unwrap_used,
    reason = "Test utilities use .unwrap() for brevity"
)]

//! Shared test utilities for `camsync` unit tests.
//!
//! This module provides a scripted stand-in for the external control tool. It is
//! only compiled during testing (`#[cfg(test)]`).

use crate::device::{CommandError, CommandOutput, DeviceCommandRunner};
use crate::params::ControlledParameter;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted behavior for one parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Exit status 0
    Succeed,
    /// Generic failure
    Fail,
    /// Report a timeout without waiting for it
    TimeOut,
    /// Report a missing device node
    DeviceUnavailable,
    /// Block for the duration, then succeed
    Delay(Duration),
}

/// Runner that records every call and answers from a per-parameter script
///
/// Unscripted parameters succeed.
pub struct FakeRunner {
    scripts: Mutex<HashMap<ControlledParameter, Script>>,
    calls: Mutex<Vec<(u32, ControlledParameter, i64)>>,
    in_flight: [AtomicUsize; 2],
    max_in_flight: [AtomicUsize; 2],
}

impl FakeRunner {
    /// Create a runner where every call succeeds
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: [AtomicUsize::new(0), AtomicUsize::new(0)],
            max_in_flight: [AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    /// Set the behavior for `param`
    pub fn script(&self, param: ControlledParameter, script: Script) {
        self.scripts.lock().unwrap().insert(param, script);
    }

    /// Every call so far, in issue order
    pub fn calls(&self) -> Vec<(u32, ControlledParameter, i64)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls for `param`
    pub fn calls_for(&self, param: ControlledParameter) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p, _)| *p == param)
            .count()
    }

    /// Highest number of simultaneous calls observed for `param`
    pub fn max_in_flight(&self, param: ControlledParameter) -> usize {
        self.max_in_flight[slot(param)].load(Ordering::SeqCst)
    }
}

fn slot(param: ControlledParameter) -> usize {
    match param {
        ControlledParameter::Exposure => 0,
        ControlledParameter::FrameRate => 1,
    }
}

impl DeviceCommandRunner for FakeRunner {
    fn apply(
        &self,
        device_index: u32,
        param: ControlledParameter,
        value: i64,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push((device_index, param, value));

        let in_flight = self.in_flight[slot(param)].fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight[slot(param)].fetch_max(in_flight, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&param)
            .copied()
            .unwrap_or(Script::Succeed);

        let result = match script {
            Script::Succeed => Ok(CommandOutput::default()),
            Script::Fail => Err(CommandError::Io(std::io::Error::other("scripted failure"))),
            Script::TimeOut => Err(CommandError::TimedOut {
                after: Duration::from_secs(2),
            }),
            Script::DeviceUnavailable => Err(CommandError::DeviceUnavailable {
                index: device_index,
            }),
            Script::Delay(delay) => {
                std::thread::sleep(delay);
                Ok(CommandOutput::default())
            }
        };

        self.in_flight[slot(param)].fetch_sub(1, Ordering::SeqCst);
        result
    }
}
