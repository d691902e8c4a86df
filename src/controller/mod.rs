//! User-triggered apply module
//!
//! This module handles explicit "apply" actions coming from the UI collaborator.
//!
//! # Overview
//!
//! The apply handler provides:
//! - **Immediate invocation** of a requested value, independent of the scheduler's
//!   cadence
//! - **Validation** against the parameter's bound before anything reaches the device
//! - **Read accessors** for targets, confirmed values and outcomes
//!
//! # Event Flow
//!
//! ```text
//! UI → apply_now → ParameterStore::set_target → apply gate → runner → record
//!                                                                       ↓
//!                                                               SyncEvent → UI
//! ```
//!
//! # Error Propagation
//!
//! - `OutOfRange` is returned synchronously and the target is left unchanged
//! - `DeviceUnavailable` is returned once; the handler does not retry
//! - Any other command failure is recorded as `Failure` and left to the scheduler

pub mod apply_handler;

pub use apply_handler::ApplyRequestHandler;
