//! Kernel capture plumbing
//!
//! - eBPF program loading and tracepoint attachment
//! - Ring buffer record decoding
//! - Event dispatch into the connection factory
//! - The periodic reaper task
//! - Output formatting and kernel-side diagnostics

pub mod decoder;
pub mod diagnostics;
pub mod dispatcher;
pub mod ebpf_setup;
pub mod event_display;
pub mod reaper;

pub use decoder::decode;
pub use diagnostics::print_capture_diagnostics;
pub use dispatcher::{DispatchStats, EventDispatcher};
pub use ebpf_setup::{
    attach_socket_tracepoints, init_ebpf_logger, load_ebpf_program, register_allowed_pids,
};
pub use event_display::{
    display_inventory, display_reap_report, display_statistics, format_reaped_connection,
    format_schema,
};
pub use reaper::{Reaper, DEFAULT_REAP_INTERVAL};
