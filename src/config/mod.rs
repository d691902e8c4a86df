//! Configuration management module
//!
//! This module handles loading the runtime options of the synchronization loop
//! (control tool, tick period, command timeout). Options come from an optional
//! JSON file named on the command line or by `CAMSYNC_CONFIG`; command-line flags
//! override file values.

pub mod manager;
pub mod models;

pub use manager::{CONFIG_ENV_VAR, ConfigManager};
pub use models::SyncConfig;
