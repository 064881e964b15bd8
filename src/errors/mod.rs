//! # Error Handling
//!
//! Error handling for the flowsync engine. Types live in [`types`]; this module
//! re-exports them under the short names used across the crate.

pub mod types;

pub use types::{FlowsyncError, Result};

/// Short alias used by most modules
pub type Error = FlowsyncError;
