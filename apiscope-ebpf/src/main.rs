//! # eBPF Kernel-Side Socket Tracing
//!
//! Tracepoint programs that follow accepted sockets through their lifetime and
//! stream open/data/close records to userspace.
//!
//! ## Programs
//!
//! - `sys_enter_accept4` / `sys_exit_accept4` (and the `accept` pair) - register a new connection
//! - `sys_enter_read` / `sys_exit_read` - ingress bytes
//! - `sys_enter_write` / `sys_exit_write` - egress bytes
//! - `sys_enter_close` / `sys_exit_close` - lifetime totals, unregister
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer (16MB) for socket records
//! - `ALLOWED_PIDS` - Optional PID allow list, enabled through `CONFIG`
//! - `CONFIG` - Runtime configuration
//! - `CONN_INFO` - Tracked sockets keyed by `tgid << 32 | fd`
//! - `DROPPED_EVENTS` - Records lost because the ring buffer was full
//!
//! ## Build
//!
//! Always compiled in release mode:
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use apiscope_common::{AcceptArgs, CloseArgs, ConnId, ConnInfo, DataArgs, SockAddrIn};
use apiscope_common::{SocketCloseEvent, SocketDataAttr, SocketDataEvent, SocketOpenEvent};
use apiscope_common::{
    AF_INET, CONFIG_PID_FILTER, DIRECTION_EGRESS, DIRECTION_INGRESS, EVENT_SOCKET_CLOSE,
    EVENT_SOCKET_DATA, EVENT_SOCKET_OPEN, MAX_MSG_SIZE,
};
use aya_ebpf::{
    helpers::{
        bpf_get_current_pid_tgid, bpf_ktime_get_ns, bpf_probe_read_user, bpf_probe_read_user_buf,
    },
    macros::{map, tracepoint},
    maps::{HashMap, RingBuf},
    programs::TracePointContext,
};
use aya_log_ebpf::debug;

// ============================================================================
// Tracepoint Field Offsets
// ============================================================================

// Layout from /sys/kernel/debug/tracing/events/syscalls/sys_enter_*/format:
// 8 bytes of common fields, `__syscall_nr` padded to 8, then one u64 per arg.
const ARG0_OFFSET: usize = 16;
const ARG1_OFFSET: usize = 24;

// sys_exit_*: `long ret` follows the common fields and `__syscall_nr`
const RET_OFFSET: usize = 16;

// ============================================================================
// eBPF Maps
// ============================================================================

/// Ring buffer for socket records (data events are ~30KB each)
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(16 * 1024 * 1024, 0);

/// PID allow list, consulted only when `CONFIG[CONFIG_PID_FILTER]` is non-zero
#[map]
static ALLOWED_PIDS: HashMap<u32, u8> = HashMap::with_max_entries(1024, 0);

/// Map: Config key → Config value
#[map]
static CONFIG: HashMap<u32, u64> = HashMap::with_max_entries(16, 0);

/// Map: `tgid << 32 | fd` → tracked connection
#[map]
static CONN_INFO: HashMap<u64, ConnInfo> = HashMap::with_max_entries(131_072, 0);

/// Map: pid_tgid → in-flight accept arguments
#[map]
static ACCEPT_ARGS: HashMap<u64, AcceptArgs> = HashMap::with_max_entries(1024, 0);

/// Map: pid_tgid → in-flight read arguments
#[map]
static READ_ARGS: HashMap<u64, DataArgs> = HashMap::with_max_entries(1024, 0);

/// Map: pid_tgid → in-flight write arguments
#[map]
static WRITE_ARGS: HashMap<u64, DataArgs> = HashMap::with_max_entries(1024, 0);

/// Map: pid_tgid → in-flight close arguments
#[map]
static CLOSE_ARGS: HashMap<u64, CloseArgs> = HashMap::with_max_entries(1024, 0);

/// Records dropped because the ring buffer was full
#[map]
static DROPPED_EVENTS: HashMap<u32, u64> = HashMap::with_max_entries(1, 0);

// ============================================================================
// accept / accept4
// ============================================================================

#[tracepoint]
pub fn sys_enter_accept4(ctx: TracePointContext) -> u32 {
    match try_enter_accept(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_exit_accept4(ctx: TracePointContext) -> u32 {
    match try_exit_accept(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_enter_accept(ctx: TracePointContext) -> u32 {
    match try_enter_accept(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_exit_accept(ctx: TracePointContext) -> u32 {
    match try_exit_accept(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_enter_accept(ctx: &TracePointContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    if !is_pid_allowed(pid_tgid) {
        return Ok(());
    }

    let addr: u64 = unsafe { ctx.read_at(ARG1_OFFSET)? };
    let args = AcceptArgs { addr };
    unsafe {
        ACCEPT_ARGS.insert(&pid_tgid, &args, 0)?;
    }
    Ok(())
}

fn try_exit_accept(ctx: &TracePointContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let Some(args) = (unsafe { ACCEPT_ARGS.get(&pid_tgid).copied() }) else {
        return Ok(());
    };
    let _ = unsafe { ACCEPT_ARGS.remove(&pid_tgid) };

    let ret: i64 = unsafe { ctx.read_at(RET_OFFSET)? };
    if ret < 0 {
        return Ok(());
    }

    let mut addr = SockAddrIn::default();
    if args.addr != 0 {
        if let Ok(read) = unsafe { bpf_probe_read_user(args.addr as *const SockAddrIn) } {
            addr = read;
        }
    }
    // Only IPv4 peers are decoded; other families are still tracked
    if addr.family != AF_INET {
        addr = SockAddrIn::default();
    }

    let now = unsafe { bpf_ktime_get_ns() };
    let fd = ret as i32;
    let conn_id = ConnId {
        pid: (pid_tgid >> 32) as u32,
        fd,
        tsid: now,
    };
    let info = ConnInfo {
        conn_id,
        addr,
        written_bytes: 0,
        read_bytes: 0,
    };
    unsafe {
        CONN_INFO.insert(&conn_key(pid_tgid, fd), &info, 0)?;
    }

    let event = SocketOpenEvent {
        kind: EVENT_SOCKET_OPEN,
        _padding: 0,
        timestamp_ns: now,
        conn_id,
        addr,
    };
    debug!(ctx, "accepted fd {} for pid {}", fd, conn_id.pid);
    output_or_count(EVENTS.output(&event, 0));
    Ok(())
}

// ============================================================================
// read / write
// ============================================================================

#[tracepoint]
pub fn sys_enter_read(ctx: TracePointContext) -> u32 {
    match try_enter_data(&ctx, &READ_ARGS) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_exit_read(ctx: TracePointContext) -> u32 {
    match try_exit_data(&ctx, &READ_ARGS, DIRECTION_INGRESS) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_enter_write(ctx: TracePointContext) -> u32 {
    match try_enter_data(&ctx, &WRITE_ARGS) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_exit_write(ctx: TracePointContext) -> u32 {
    match try_exit_data(&ctx, &WRITE_ARGS, DIRECTION_EGRESS) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_enter_data(ctx: &TracePointContext, args_map: &HashMap<u64, DataArgs>) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    if !is_pid_allowed(pid_tgid) {
        return Ok(());
    }

    let fd: u64 = unsafe { ctx.read_at(ARG0_OFFSET)? };
    let fd = fd as i32;
    // Skip fds that are not accepted sockets before touching args maps
    if unsafe { CONN_INFO.get(&conn_key(pid_tgid, fd)).is_none() } {
        return Ok(());
    }

    let buf: u64 = unsafe { ctx.read_at(ARG1_OFFSET)? };
    let args = DataArgs {
        fd,
        _padding: 0,
        buf,
    };
    unsafe {
        args_map.insert(&pid_tgid, &args, 0)?;
    }
    Ok(())
}

fn try_exit_data(
    ctx: &TracePointContext,
    args_map: &HashMap<u64, DataArgs>,
    direction: u32,
) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let Some(args) = (unsafe { args_map.get(&pid_tgid).copied() }) else {
        return Ok(());
    };
    let _ = unsafe { args_map.remove(&pid_tgid) };

    let ret: i64 = unsafe { ctx.read_at(RET_OFFSET)? };
    if ret <= 0 {
        return Ok(());
    }

    let key = conn_key(pid_tgid, args.fd);
    let Some(info) = CONN_INFO.get_ptr_mut(&key) else {
        return Ok(());
    };

    let pos = unsafe {
        if direction == DIRECTION_INGRESS {
            let pos = (*info).read_bytes;
            (*info).read_bytes += ret;
            pos
        } else {
            let pos = (*info).written_bytes;
            (*info).written_bytes += ret;
            pos
        }
    };
    let conn_id = unsafe { (*info).conn_id };

    let Some(mut entry) = EVENTS.reserve::<SocketDataEvent>(0) else {
        count_dropped();
        return Ok(());
    };

    let size = (ret as usize).min(MAX_MSG_SIZE);
    let event = entry.as_mut_ptr();
    unsafe {
        (*event).attr = SocketDataAttr {
            kind: EVENT_SOCKET_DATA,
            direction,
            timestamp_ns: bpf_ktime_get_ns(),
            conn_id,
            msg_size: size as u32,
            _padding: 0,
            pos: pos as u64,
        };
        let msg = &mut (*event).msg;
        let src = args.buf as *const u8;
        let copied = size > 0
            && size <= msg.len()
            && bpf_probe_read_user_buf(src, &mut msg[..size]).is_ok();
        if !copied {
            entry.discard(0);
            return Ok(());
        }
    }
    entry.submit(0);
    Ok(())
}

// ============================================================================
// close
// ============================================================================

#[tracepoint]
pub fn sys_enter_close(ctx: TracePointContext) -> u32 {
    match try_enter_close(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

#[tracepoint]
pub fn sys_exit_close(ctx: TracePointContext) -> u32 {
    match try_exit_close(&ctx) {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

fn try_enter_close(ctx: &TracePointContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let fd: u64 = unsafe { ctx.read_at(ARG0_OFFSET)? };
    let fd = fd as i32;
    if unsafe { CONN_INFO.get(&conn_key(pid_tgid, fd)).is_none() } {
        return Ok(());
    }

    let args = CloseArgs { fd };
    unsafe {
        CLOSE_ARGS.insert(&pid_tgid, &args, 0)?;
    }
    Ok(())
}

fn try_exit_close(ctx: &TracePointContext) -> Result<(), i64> {
    let pid_tgid = unsafe { bpf_get_current_pid_tgid() };
    let Some(args) = (unsafe { CLOSE_ARGS.get(&pid_tgid).copied() }) else {
        return Ok(());
    };
    let _ = unsafe { CLOSE_ARGS.remove(&pid_tgid) };

    let ret: i64 = unsafe { ctx.read_at(RET_OFFSET)? };
    if ret != 0 {
        return Ok(());
    }

    let key = conn_key(pid_tgid, args.fd);
    let Some(info) = (unsafe { CONN_INFO.get(&key).copied() }) else {
        return Ok(());
    };
    let _ = unsafe { CONN_INFO.remove(&key) };

    let event = SocketCloseEvent {
        kind: EVENT_SOCKET_CLOSE,
        _padding: 0,
        timestamp_ns: unsafe { bpf_ktime_get_ns() },
        conn_id: info.conn_id,
        written_bytes: info.written_bytes,
        read_bytes: info.read_bytes,
    };
    output_or_count(EVENTS.output(&event, 0));
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn conn_key(pid_tgid: u64, fd: i32) -> u64 {
    (pid_tgid & 0xFFFF_FFFF_0000_0000) | u64::from(fd as u32)
}

fn is_pid_allowed(pid_tgid: u64) -> bool {
    let filter_enabled = unsafe { CONFIG.get(&CONFIG_PID_FILTER).copied().unwrap_or(0) };
    if filter_enabled == 0 {
        return true;
    }
    let tgid = (pid_tgid >> 32) as u32;
    unsafe { ALLOWED_PIDS.get(&tgid).is_some() }
}

fn output_or_count(result: Result<(), i64>) {
    if result.is_err() {
        count_dropped();
    }
}

fn count_dropped() {
    unsafe {
        let key = 0u32;
        let current = DROPPED_EVENTS.get(&key).copied().unwrap_or(0);
        let _ = DROPPED_EVENTS.insert(&key, &(current + 1), 0);
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
