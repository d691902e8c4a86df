//! Shared invocation path
//!
//! Both the periodic scheduler and user-triggered apply requests push values to the
//! device through `SyncContext::apply_locked`, so a value is validated, invoked,
//! recorded and reported the same way whichever side asked for it.

use crate::device::{CommandError, DeviceCommandRunner};
use crate::params::{ApplyOutcome, ControlledParameter, ParameterStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Instant;

/// Who asked for an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplySource {
    /// Periodic scheduler tick
    Scheduler,
    /// Explicit user request
    User,
}

/// Notifications for a UI collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A value was confirmed by the device
    Applied {
        /// Parameter that was applied
        param: ControlledParameter,
        /// Value now running on the device
        value: i64,
        /// Who triggered the invocation
        source: ApplySource,
    },
    /// An invocation failed and will be retried on a later tick
    Failed {
        /// Parameter that was attempted
        param: ControlledParameter,
        /// Value that was attempted
        value: i64,
        /// Who triggered the invocation
        source: ApplySource,
        /// Diagnostic message
        reason: String,
    },
    /// The device node disappeared; background synchronization is suspended
    DeviceUnavailable {
        /// Device index that is missing
        index: u32,
    },
}

/// Result of one invocation
#[derive(Debug)]
pub struct ApplyAttempt {
    /// Parameter that was attempted
    pub param: ControlledParameter,
    /// Value that was attempted
    pub value: i64,
    /// Outcome recorded in the store
    pub outcome: ApplyOutcome,
    /// Error reported by the runner on failure
    pub error: Option<CommandError>,
}

impl ApplyAttempt {
    /// Whether the failure was caused by a missing device node
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self.error, Some(CommandError::DeviceUnavailable { .. }))
    }
}

/// Non-blocking event sender
///
/// Events are dropped when the consumer falls behind so that neither the scheduler
/// nor an apply request ever waits on the UI.
#[derive(Clone, Default)]
pub struct EventSink(Option<mpsc::SyncSender<SyncEvent>>);

impl EventSink {
    /// Sink forwarding to `sender`
    pub fn new(sender: mpsc::SyncSender<SyncEvent>) -> Self {
        Self(Some(sender))
    }

    /// Send `event` if there is room in the channel
    pub fn notify(&self, event: SyncEvent) {
        use tracing::debug;

        let Some(sender) = &self.0 else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::TrySendError::Full(event)) => {
                debug!("Event channel full, dropping {:?}", event);
            }
            Err(mpsc::TrySendError::Disconnected(_)) => {
                debug!("Event receiver gone, dropping event");
            }
        }
    }
}

/// Everything needed to push a value to the device and record the result
#[derive(Clone)]
pub struct SyncContext {
    store: Arc<ParameterStore>,
    runner: Arc<dyn DeviceCommandRunner>,
    device_index: u32,
    events: EventSink,
    suspended: Arc<AtomicBool>,
}

impl SyncContext {
    /// Create a context for `/dev/video<device_index>`
    pub fn new(
        store: Arc<ParameterStore>,
        runner: Arc<dyn DeviceCommandRunner>,
        device_index: u32,
    ) -> Self {
        Self {
            store,
            runner,
            device_index,
            events: EventSink::default(),
            suspended: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report events on `sender`
    #[must_use]
    pub fn with_events(mut self, sender: mpsc::SyncSender<SyncEvent>) -> Self {
        self.events = EventSink::new(sender);
        self
    }

    /// Shared parameter store
    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    /// Device index all invocations target
    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    /// Event sink shared with the scheduler
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Whether background synchronization is suspended after losing the device
    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    /// Suspend background synchronization, returning true if it was running
    pub(crate) fn suspend(&self) -> bool {
        !self.suspended.swap(true, Ordering::SeqCst)
    }

    /// Resume background synchronization, returning true if it was suspended
    pub fn resume(&self) -> bool {
        use tracing::info;

        let was_suspended = self.suspended.swap(false, Ordering::SeqCst);
        if was_suspended {
            info!("Background synchronization resumed");
        }
        was_suspended
    }

    /// Invoke the runner for `param = value` and record the result
    ///
    /// The caller must hold `param`'s apply gate for the duration of the call.
    pub fn apply_locked(
        &self,
        param: ControlledParameter,
        value: i64,
        source: ApplySource,
    ) -> ApplyAttempt {
        use tracing::{info, warn};

        let result = self.runner.apply(self.device_index, param, value);
        let outcome = if result.is_ok() {
            ApplyOutcome::Success
        } else {
            ApplyOutcome::Failure
        };
        self.store
            .record_apply_result(param, value, outcome, Instant::now());

        match result {
            Ok(_) => {
                info!(
                    "Applied {} = {} {} on /dev/video{} ({:?})",
                    param,
                    value,
                    param.unit(),
                    self.device_index,
                    source
                );
                self.events.notify(SyncEvent::Applied {
                    param,
                    value,
                    source,
                });
                ApplyAttempt {
                    param,
                    value,
                    outcome,
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    "Failed to apply {} = {} on /dev/video{} ({:?}): {}",
                    param, value, self.device_index, source, e
                );
                self.events.notify(SyncEvent::Failed {
                    param,
                    value,
                    source,
                    reason: e.to_string(),
                });
                ApplyAttempt {
                    param,
                    value,
                    outcome,
                    error: Some(e),
                }
            }
        }
    }
}
