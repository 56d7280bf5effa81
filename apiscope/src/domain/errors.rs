//! Structured error types for apiscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Why a reassembled exchange produced no inventory entry
///
/// Always skippable: reaping logs these and moves on.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("incomplete HTTP request head")]
    IncompleteRequest,

    #[error("incomplete HTTP response head")]
    IncompleteResponse,

    #[error("malformed HTTP request: {0}")]
    MalformedRequest(httparse::Error),

    #[error("malformed HTTP response: {0}")]
    MalformedResponse(httparse::Error),

    #[error("malformed chunked body: {0}")]
    MalformedChunk(&'static str),
}

/// A ring buffer record that could not be turned into a socket event
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record too short: {actual} bytes, expected at least {expected}")]
    TooShort { expected: usize, actual: usize },

    #[error("unknown event kind {0}")]
    UnknownKind(u32),

    #[error("payload size {0} exceeds the chunk limit")]
    OversizedPayload(u32),
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to load eBPF object {path}: {source}")]
    EbpfLoadFailed {
        path: PathBuf,
        source: aya::EbpfError,
    },

    #[error("eBPF program {0} not found in object")]
    ProgramNotFound(String),

    #[error("Failed to attach {program}: {source}")]
    ProbeAttachFailed {
        program: String,
        source: aya::programs::ProgramError,
    },

    #[error("eBPF map {0} not found in object")]
    MapNotFound(&'static str),

    #[error(transparent)]
    Map(#[from] aya::maps::MapError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
