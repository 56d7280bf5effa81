//! Kernel timestamp conversion
//!
//! Probe timestamps come from `bpf_ktime_get_ns()` (`CLOCK_MONOTONIC`,
//! nanoseconds since boot). [`KernelClock`] measures the distance to the
//! wall clock once at startup and converts timestamps for display.

use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelClock {
    /// `CLOCK_REALTIME - CLOCK_MONOTONIC`, in nanoseconds
    offset_ns: u64,
}

impl KernelClock {
    /// Sample both clocks and record their offset
    ///
    /// # Errors
    /// Returns an error if the monotonic clock cannot be read
    pub fn detect() -> io::Result<Self> {
        let monotonic = monotonic_now()?;
        let realtime = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|ns| u64::try_from(ns).ok())
            .ok_or_else(|| io::Error::other("wall clock out of range"))?;

        let monotonic_ns = u64::try_from(monotonic.as_nanos()).unwrap_or(u64::MAX);
        Ok(Self::from_offset(realtime.saturating_sub(monotonic_ns)))
    }

    #[must_use]
    pub const fn from_offset(offset_ns: u64) -> Self {
        Self { offset_ns }
    }

    #[must_use]
    pub fn to_system_time(&self, kernel_ns: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.offset_ns.saturating_add(kernel_ns))
    }

    /// Wall-clock time of day (`HH:MM:SS.mmm`, UTC)
    #[must_use]
    pub fn format(&self, kernel_ns: u64) -> String {
        DateTime::<Utc>::from(self.to_system_time(kernel_ns))
            .format("%H:%M:%S%.3f")
            .to_string()
    }
}

/// Current `CLOCK_MONOTONIC` reading, the clock `bpf_ktime_get_ns()` uses
fn monotonic_now() -> io::Result<Duration> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: ts is a valid, writable timespec
    #[allow(unsafe_code)]
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let secs = u64::try_from(ts.tv_sec).map_err(io::Error::other)?;
    let nanos = u32::try_from(ts.tv_nsec).map_err(io::Error::other)?;
    Ok(Duration::new(secs, nanos))
}
