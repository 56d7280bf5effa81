//! Domain model for apiscope
//!
//! This module contains core domain types and errors that provide:
//! - Identity types decoupled from the kernel record layout
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{ConnectionId, Direction};

pub use errors::{CaptureError, DecodeError, ExportError, InferenceError};
