//! `camsync` - Keep an Arducam's exposure and frame rate in sync with the desired values
//!
//! The camera driver silently drops control settings (for example when the stream
//! restarts), so the desired values are re-asserted periodically through the
//! external `v4l2-ctl` tool. A `SyncScheduler` re-applies every parameter whose
//! desired value has not been confirmed on the device, while the
//! `ApplyRequestHandler` pushes explicit user requests immediately. Both share a
//! `ParameterStore` and a `DeviceCommandRunner`.
//!
//! # Requirements
//!
//! - Linux with a V4L2 camera at `/dev/videoN`
//! - `v4l2-ctl` from v4l-utils on `PATH`

// Module declarations
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod params;
pub mod scheduler;
pub mod utils;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use error::{CamSyncError, Result};
