//! Socket events as seen by the connection tracker
//!
//! Decoded from kernel records by [`crate::capture::decoder`]; data payloads
//! borrow straight from the ring buffer record.

use std::net::SocketAddr;

use crate::domain::{ConnectionId, Direction};

/// A socket was accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEvent {
    pub conn_id: ConnectionId,
    pub timestamp_ns: u64,
    pub peer: Option<SocketAddr>,
}

/// A chunk of bytes moved over a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataEvent<'a> {
    pub conn_id: ConnectionId,
    pub timestamp_ns: u64,
    pub direction: Direction,
    pub payload: &'a [u8],
}

/// A socket was closed
///
/// The totals cover the socket's whole lifetime as counted by the kernel,
/// including bytes beyond the per-chunk copy limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub conn_id: ConnectionId,
    pub timestamp_ns: u64,
    pub read_bytes: u64,
    pub written_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent<'a> {
    Open(OpenEvent),
    Data(DataEvent<'a>),
    Close(CloseEvent),
}
