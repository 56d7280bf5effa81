//! # apiscope - eBPF-based HTTP API Discovery
//!
//! apiscope watches the sockets accepted by local server processes, rebuilds
//! each connection's request and response byte streams from kernel syscall
//! traces, and learns an inventory of the HTTP endpoints it sees: the
//! structure of every JSON request/response body and whether the response
//! looks like it carries personally identifiable information.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Server Processes                            │
//! │              accept() / read() / write() / close()              │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ syscalls
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     eBPF Programs (Kernel)                      │
//! │  • Tracepoints: syscalls/sys_{enter,exit}_{accept,accept4}      │
//! │  • Tracepoints: syscalls/sys_{enter,exit}_{read,write,close}    │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ ring buffer records (open / data / close)
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    apiscope (This Crate)                        │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │   Capture    │──▶│  Dispatcher  │──▶│   Factory    │         │
//! │  │ (eBPF, ring) │   │  (decoder)   │   │  (trackers)  │         │
//! │  └──────────────┘   └──────────────┘   └──────┬───────┘         │
//! │                                               │ reap pass       │
//! │                                               ▼                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │    Export    │◀──│  Inventory   │◀──│  Inference   │         │
//! │  │ (JSON file)  │   │ (first seen) │   │ (HTTP+JSON)  │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`capture`]: eBPF loading and attachment, ring buffer decoding, event
//!   dispatch, the periodic reaper task, and console output
//! - [`connections`]: per-connection trackers, lifecycle classification and
//!   the factory that owns them
//! - [`schema`]: HTTP reassembly, value stripping, PII detection and the API
//!   inventory
//! - [`export`]: inventory JSON export
//! - [`cli`]: command-line arguments
//! - [`clock`]: kernel timestamp to wall-clock conversion
//! - [`preflight`]: privilege and kernel checks
//! - [`domain`]: identifiers, directions and error types
//!
//! ## Connection Lifecycle
//!
//! Events for a connection accumulate in its tracker until a reap pass
//! classifies it:
//!
//! - **Complete**: closed with every byte accounted for; the exchange is
//!   parsed and, if it is a successful JSON exchange, added to the inventory
//! - **Malformed**: closed but the captured bytes disagree with the kernel
//!   totals; dropped
//! - **Stale**: idle past the inactivity threshold; dropped
//! - **Open**: left alone
//!
//! ## Typical Usage
//!
//! ```bash
//! # Build the probes and run against every accepted socket
//! cargo xtask run
//!
//! # Limit tracing to one server and save the inventory on exit
//! sudo ./apiscope --pid <PID> --export inventory.json
//! ```

pub mod capture;
pub mod cli;
pub mod clock;
pub mod connections;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod schema;
