//! # Shared Data Structures (eBPF ↔ Userspace)
//!
//! Defines the socket trace records exchanged between the kernel-side
//! tracepoint programs and userspace. All types use `#[repr(C)]` for a
//! consistent memory layout across the kernel/userspace boundary.
//!
//! ## Record Layout
//!
//! Every record written to the `EVENTS` ring buffer starts with a `u32` kind
//! tag so userspace can dispatch before reading the rest:
//!
//! - [`SocketOpenEvent`] - an accepted connection (`accept`/`accept4` returned)
//! - [`SocketDataEvent`] - bytes moved by `read`/`write` on a tracked socket
//! - [`SocketCloseEvent`] - `close` succeeded, carries lifetime byte totals

#![no_std]

// ============================================================================
// Event Kind Tags
// ============================================================================

/// A tracked socket was accepted
pub const EVENT_SOCKET_OPEN: u32 = 1;

/// A `read`/`write` chunk on a tracked socket
pub const EVENT_SOCKET_DATA: u32 = 2;

/// A tracked socket was closed
pub const EVENT_SOCKET_CLOSE: u32 = 3;

// ============================================================================
// Data Direction
// ============================================================================

/// Zeroed direction, never emitted by the probes
pub const DIRECTION_UNKNOWN: u32 = 0;

/// Bytes written by the traced process (`write`)
pub const DIRECTION_EGRESS: u32 = 1;

/// Bytes read by the traced process (`read`)
pub const DIRECTION_INGRESS: u32 = 2;

/// Maximum payload bytes copied per data event
///
/// Larger syscalls are truncated kernel-side; the full size is still counted
/// in the per-connection totals reported at close.
pub const MAX_MSG_SIZE: usize = 30720;

/// `sa_family` value for IPv4 socket addresses
pub const AF_INET: u16 = 2;

// ============================================================================
// Config Map Keys
// ============================================================================

/// `CONFIG` key: non-zero enables the `ALLOWED_PIDS` filter
pub const CONFIG_PID_FILTER: u32 = 0;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Identity of one socket's lifetime
///
/// `tsid` is the kernel timestamp taken when the socket was accepted, so a
/// reused file descriptor never collides with an earlier session.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId {
    /// Process ID (TGID) owning the socket
    pub pid: u32,
    /// File descriptor within the process
    pub fd: i32,
    /// Accept timestamp in nanoseconds (`bpf_ktime_get_ns()`)
    pub tsid: u64,
}

/// Kernel `struct sockaddr_in`, fields in network byte order
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SockAddrIn {
    pub family: u16,
    pub port: u16,
    pub addr: u32,
    #[allow(clippy::pub_underscore_fields)]
    pub _zero: [u8; 8],
}

/// Emitted when `accept`/`accept4` returns a new socket
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SocketOpenEvent {
    /// Always [`EVENT_SOCKET_OPEN`]
    pub kind: u32,
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
    /// Monotonic kernel timestamp (nanoseconds since boot)
    pub timestamp_ns: u64,
    pub conn_id: ConnId,
    /// Peer address as filled in by the kernel
    pub addr: SockAddrIn,
}

/// Fixed-size header of a [`SocketDataEvent`]
///
/// Userspace reads this header and then exactly `msg_size` payload bytes that
/// follow it, never the whole `msg` array.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SocketDataAttr {
    /// Always [`EVENT_SOCKET_DATA`]
    pub kind: u32,
    /// [`DIRECTION_EGRESS`] or [`DIRECTION_INGRESS`]
    pub direction: u32,
    pub timestamp_ns: u64,
    pub conn_id: ConnId,
    /// Number of valid bytes in `msg` (at most [`MAX_MSG_SIZE`])
    pub msg_size: u32,
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
    /// Bytes already moved in this direction before this chunk
    pub pos: u64,
}

/// Emitted for every successful `read`/`write` on a tracked socket
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SocketDataEvent {
    pub attr: SocketDataAttr,
    pub msg: [u8; MAX_MSG_SIZE],
}

/// Emitted when `close` succeeds on a tracked socket
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SocketCloseEvent {
    /// Always [`EVENT_SOCKET_CLOSE`]
    pub kind: u32,
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
    pub timestamp_ns: u64,
    pub conn_id: ConnId,
    /// Total bytes written over the socket's lifetime
    pub written_bytes: i64,
    /// Total bytes read over the socket's lifetime
    pub read_bytes: i64,
}

/// Kernel-side bookkeeping for a tracked socket (`CONN_INFO` map value)
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct ConnInfo {
    pub conn_id: ConnId,
    pub addr: SockAddrIn,
    pub written_bytes: i64,
    pub read_bytes: i64,
}

/// Arguments of an in-flight `accept`/`accept4`, keyed by pid_tgid
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AcceptArgs {
    /// User pointer to the `struct sockaddr` the kernel fills in
    pub addr: u64,
}

/// Arguments of an in-flight `read`/`write`, keyed by pid_tgid
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DataArgs {
    pub fd: i32,
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,
    /// User pointer to the syscall buffer
    pub buf: u64,
}

/// Arguments of an in-flight `close`, keyed by pid_tgid
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CloseArgs {
    pub fd: i32,
}

#[cfg(feature = "user")]
use aya::Pod;

// These unsafe impls are required for eBPF <-> userspace communication
// Pod trait ensures types can be safely transmitted as plain bytes
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ConnId {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SockAddrIn {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for ConnInfo {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SocketOpenEvent {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SocketDataAttr {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for SocketCloseEvent {}
