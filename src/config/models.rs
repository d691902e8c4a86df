//! Configuration data models
//!
//! This module defines the runtime options of the synchronization loop.

use crate::device::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_TOOL};
use crate::error::{CamSyncError, Result, StringError};
use crate::scheduler::DEFAULT_SYNC_INTERVAL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Runtime options for the synchronization loop
///
/// Target values are deliberately absent: they come from the command line and are
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Control tool to invoke
    pub tool: PathBuf,
    /// Scheduler period in milliseconds
    pub sync_interval_ms: u64,
    /// Per-invocation timeout in milliseconds
    pub command_timeout_ms: u64,
    /// Re-apply confirmed values older than this many milliseconds (disabled when unset)
    pub reassert_after_ms: Option<u64>,
    /// Capacity of the event channel towards the UI
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tool: PathBuf::from(DEFAULT_TOOL),
            sync_interval_ms: duration_ms(DEFAULT_SYNC_INTERVAL),
            command_timeout_ms: duration_ms(DEFAULT_COMMAND_TIMEOUT),
            reassert_after_ms: None,
            event_capacity: 32,
        }
    }
}

impl SyncConfig {
    /// Scheduler period
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    /// Per-invocation timeout
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Staleness age for re-assertion, if enabled
    pub fn reassert_after(&self) -> Option<Duration> {
        self.reassert_after_ms.map(Duration::from_millis)
    }

    /// Reject values the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.tool.as_os_str().is_empty() {
            return Err(invalid("tool must not be empty"));
        }
        if self.sync_interval_ms == 0 {
            return Err(invalid("sync_interval_ms must be greater than zero"));
        }
        if self.command_timeout_ms == 0 {
            return Err(invalid("command_timeout_ms must be greater than zero"));
        }
        if self.event_capacity == 0 {
            return Err(invalid("event_capacity must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> CamSyncError {
    CamSyncError::ConfigError(StringError::new(msg))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
