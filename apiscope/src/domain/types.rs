//! Core domain types
//!
//! Newtypes that keep kernel record layouts out of the connection-tracking
//! and inference code.

use std::fmt;

/// Identity of one socket's lifetime on the observed host
///
/// `generation` is the kernel accept timestamp, so a file descriptor reused
/// by a later connection never maps onto an earlier session's tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    pub pid: u32,
    pub fd: i32,
    pub generation: u64,
}

impl ConnectionId {
    #[must_use]
    pub const fn new(pid: u32, fd: i32, generation: u64) -> Self {
        Self {
            pid,
            fd,
            generation,
        }
    }
}

impl From<apiscope_common::ConnId> for ConnectionId {
    fn from(id: apiscope_common::ConnId) -> Self {
        Self::new(id.pid, id.fd, id.tsid)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}/FD:{}/GEN:{}", self.pid, self.fd, self.generation)
    }
}

/// Which way a data chunk travelled, from the traced process's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Written by the traced process
    Egress,
    /// Read by the traced process
    Ingress,
    /// Unrecognized tag; recording such a chunk is a no-op
    Unknown,
}

impl Direction {
    /// Map a raw kernel direction tag
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            apiscope_common::DIRECTION_EGRESS => Self::Egress,
            apiscope_common::DIRECTION_INGRESS => Self::Ingress,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Egress => "egress",
            Self::Ingress => "ingress",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(1234, 7, 99);
        assert_eq!(id.to_string(), "PID:1234/FD:7/GEN:99");
    }

    #[test]
    fn test_connection_id_from_kernel_id() {
        let raw = apiscope_common::ConnId {
            pid: 42,
            fd: 3,
            tsid: 1_000,
        };
        assert_eq!(ConnectionId::from(raw), ConnectionId::new(42, 3, 1_000));
    }

    #[test]
    fn test_generation_distinguishes_reused_fd() {
        let first = ConnectionId::new(42, 3, 1_000);
        let second = ConnectionId::new(42, 3, 2_000);
        assert_ne!(first, second);
    }

    #[test]
    fn test_direction_from_raw() {
        assert_eq!(
            Direction::from_raw(apiscope_common::DIRECTION_EGRESS),
            Direction::Egress
        );
        assert_eq!(
            Direction::from_raw(apiscope_common::DIRECTION_INGRESS),
            Direction::Ingress
        );
        assert_eq!(Direction::from_raw(0), Direction::Unknown);
        assert_eq!(Direction::from_raw(77), Direction::Unknown);
    }
}
