//! Kernel-side capture counters printed on exit

use anyhow::{Context, Result};
use apiscope_common::ConnInfo;
use aya::maps::HashMap;
use aya::Ebpf;

/// Print kernel-side capture counters
///
/// - Events dropped because the `EVENTS` ring buffer was full
/// - Sockets still registered in `CONN_INFO` (accepted but never closed)
///
/// # Errors
/// Returns an error if the diagnostic maps cannot be accessed
pub fn print_capture_diagnostics(bpf: &Ebpf) -> Result<()> {
    let map = bpf
        .map("DROPPED_EVENTS")
        .context("DROPPED_EVENTS map not found")?;
    let dropped_map: HashMap<_, u32, u64> = HashMap::try_from(map)?;
    let dropped = dropped_map.get(&0u32, 0).unwrap_or(0);

    let map = bpf.map("CONN_INFO").context("CONN_INFO map not found")?;
    let conn_map: HashMap<_, u64, ConnInfo> = HashMap::try_from(map)?;
    let open_sockets = conn_map.keys().filter(Result::is_ok).count();

    eprintln!(
        "capture: {dropped} events dropped (ring buffer full), {open_sockets} sockets still open"
    );
    Ok(())
}
