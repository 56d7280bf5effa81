//! Lifecycle classification for tracked connections.
//!
//! Reaping decides what to do with a tracker purely from its byte counters,
//! the kernel totals reported at close, and how long it has been quiet.
//!
//! # Classification Priority
//!
//! 1. **Complete** - closed, and both counters match the kernel totals
//! 2. **Malformed** - closed, and the counters disagree with the totals
//!    (one side or both, depending on [`MalformedPolicy`])
//! 3. **Stale** - no activity for longer than the inactivity threshold
//! 4. **Open** - anything else; keep collecting
//!
//! Under [`MalformedPolicy::BothSides`] a closed connection with exactly one
//! mismatched side matches neither of the first two rules and lingers until
//! it goes stale.

use std::fmt;
use std::time::Duration;

/// Default inactivity window before an unclosed connection is dropped
pub const DEFAULT_INACTIVITY_THRESHOLD: Duration = Duration::from_secs(60);

/// Outcome of classifying one tracker during a reap pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Still receiving events normally
    Open,
    /// Closed with every byte accounted for; ready for inference
    Complete,
    /// Closed but the captured bytes disagree with the kernel totals
    Malformed,
    /// Quiet for longer than the inactivity threshold
    Stale,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::Complete => "complete",
            Self::Malformed => "malformed",
            Self::Stale => "stale",
        };
        f.write_str(name)
    }
}

/// How many sides must disagree with the kernel totals for a closed
/// connection to count as malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Either side mismatching is enough
    #[default]
    AnySide,
    /// Both sides must mismatch (`--strict-malformed`)
    BothSides,
}

/// Thresholds applied by a reap pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapPolicy {
    pub inactivity_threshold: Duration,
    pub malformed: MalformedPolicy,
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self {
            inactivity_threshold: DEFAULT_INACTIVITY_THRESHOLD,
            malformed: MalformedPolicy::default(),
        }
    }
}

/// Byte accounting of one connection at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteCounters {
    /// Bytes appended to the inbound buffer
    pub read: u64,
    /// Bytes appended to the outbound buffer
    pub written: u64,
    /// Kernel-reported lifetime read total (valid once closed)
    pub total_read: u64,
    /// Kernel-reported lifetime written total (valid once closed)
    pub total_written: u64,
}

impl ByteCounters {
    #[must_use]
    pub fn read_matches(&self) -> bool {
        self.read == self.total_read
    }

    #[must_use]
    pub fn written_matches(&self) -> bool {
        self.written == self.total_written
    }
}

/// Classify a connection from its counters.
///
/// # Arguments
///
/// * `closed` - Whether a close event has been recorded
/// * `counters` - Captured bytes and kernel totals
/// * `idle` - Time elapsed since the tracker's last activity
/// * `policy` - Inactivity threshold and malformed rule
#[must_use]
pub fn classify(
    closed: bool,
    counters: &ByteCounters,
    idle: Duration,
    policy: &ReapPolicy,
) -> Classification {
    if closed {
        let read_ok = counters.read_matches();
        let written_ok = counters.written_matches();

        if read_ok && written_ok {
            return Classification::Complete;
        }

        let malformed = match policy.malformed {
            MalformedPolicy::AnySide => true,
            MalformedPolicy::BothSides => !read_ok && !written_ok,
        };
        if malformed {
            return Classification::Malformed;
        }
    }

    if idle > policy.inactivity_threshold {
        Classification::Stale
    } else {
        Classification::Open
    }
}
