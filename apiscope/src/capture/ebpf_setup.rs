//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled socket probes and attaches them to syscall tracepoints.
//!
//! ## Attachment Points
//!
//! - **accept / accept4**: register a new connection and emit an open event
//! - **read / write**: copy up to `MAX_MSG_SIZE` bytes per call into a data event
//! - **close**: emit a close event with the lifetime byte totals
//!
//! Every probe is a `syscalls/sys_{enter,exit}_*` tracepoint, so no kernel
//! symbols or headers are needed at load time.

use apiscope_common::CONFIG_PID_FILTER;
use aya::{
    maps::HashMap,
    programs::{ProgramError, TracePoint},
    Ebpf,
};
use aya_log::EbpfLogger;
use log::{info, warn};
use std::path::Path;

use crate::domain::CaptureError;

/// Tracepoint category shared by every probe
const TRACEPOINT_CATEGORY: &str = "syscalls";

/// Program names; each is attached to the tracepoint of the same name
const SOCKET_TRACEPOINTS: &[&str] = &[
    "sys_enter_accept4",
    "sys_exit_accept4",
    "sys_enter_accept",
    "sys_exit_accept",
    "sys_enter_read",
    "sys_exit_read",
    "sys_enter_write",
    "sys_exit_write",
    "sys_enter_close",
    "sys_exit_close",
];

/// Load the eBPF object built by `cargo xtask build-ebpf`
///
/// # Errors
/// Returns an error if the object is missing or the kernel rejects it
pub fn load_ebpf_program(path: &Path) -> Result<Ebpf, CaptureError> {
    let bpf = Ebpf::load_file(path).map_err(|source| CaptureError::EbpfLoadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Loaded eBPF object {}", path.display());
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Load and attach every socket tracepoint program.
/// Returns the number of programs attached.
///
/// # Errors
/// Returns an error if a program is missing, fails verification, or cannot attach
pub fn attach_socket_tracepoints(bpf: &mut Ebpf) -> Result<usize, CaptureError> {
    for &name in SOCKET_TRACEPOINTS {
        let attach_failed = |source: ProgramError| CaptureError::ProbeAttachFailed {
            program: name.to_string(),
            source,
        };

        let program: &mut TracePoint = bpf
            .program_mut(name)
            .ok_or_else(|| CaptureError::ProgramNotFound(name.to_string()))?
            .try_into()
            .map_err(attach_failed)?;
        program.load().map_err(attach_failed)?;
        program
            .attach(TRACEPOINT_CATEGORY, name)
            .map_err(attach_failed)?;
        info!("✓ Attached tracepoint: {TRACEPOINT_CATEGORY}/{name}");
    }

    Ok(SOCKET_TRACEPOINTS.len())
}

/// Restrict tracing to `pids`. An empty list traces every process.
///
/// # Errors
/// Returns an error if the `ALLOWED_PIDS` or `CONFIG` maps cannot be updated
pub fn register_allowed_pids(bpf: &mut Ebpf, pids: &[u32]) -> Result<(), CaptureError> {
    if pids.is_empty() {
        return Ok(());
    }

    let map = bpf
        .map_mut("ALLOWED_PIDS")
        .ok_or(CaptureError::MapNotFound("ALLOWED_PIDS"))?;
    let mut allowed: HashMap<_, u32, u8> = HashMap::try_from(map)?;
    for pid in pids {
        allowed.insert(pid, 1u8, 0)?;
    }

    let map = bpf
        .map_mut("CONFIG")
        .ok_or(CaptureError::MapNotFound("CONFIG"))?;
    let mut config: HashMap<_, u32, u64> = HashMap::try_from(map)?;
    config.insert(CONFIG_PID_FILTER, 1u64, 0)?;

    info!("✓ Tracing limited to PIDs {pids:?}");
    Ok(())
}
