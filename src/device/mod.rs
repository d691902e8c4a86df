//! Device control module
//!
//! This module invokes the external `v4l2-ctl` utility to push a single control
//! value to a V4L2 device.
//!
//! # Overview
//!
//! - `DeviceCommandRunner`: adapter trait `(device index, parameter, value) ->
//!   Result<CommandOutput, CommandError>`, substitutable with a fake in tests
//! - `V4l2CtlRunner`: production implementation spawning one process per call
//!   with a bounded timeout
//!
//! # Invocation
//!
//! ```text
//! v4l2-ctl --device /dev/video<N> --set-ctrl <control-name>=<value>
//! ```
//!
//! Exit status 0 is success. Standard output and standard error are captured and
//! only used for diagnostics. The runner never retries; retry policy lives in the
//! scheduler and the apply handler.

pub mod runner;

pub use runner::{
    CommandError, CommandOutput, DEFAULT_COMMAND_TIMEOUT, DEFAULT_TOOL, DeviceCommandRunner,
    V4l2CtlRunner,
};
