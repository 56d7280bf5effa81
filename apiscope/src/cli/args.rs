//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::connections::{FactoryConfig, MalformedPolicy, DEFAULT_BUFFER_CAPACITY};
use crate::schema::{SentinelPiiDetector, DEFAULT_PII_TOKENS};

/// Where `cargo xtask build-ebpf` places the probe object
pub const DEFAULT_EBPF_OBJECT: &str = "target/bpfel-unknown-none/release/apiscope";

#[derive(Parser, Debug)]
#[command(
    name = "apiscope",
    about = "Learn the HTTP API surface of local services from socket traffic",
    after_help = "\
EXAMPLES:
    sudo apiscope                                Trace every accepted socket
    sudo apiscope --pid 1234 --pid 1235          Trace two server processes
    sudo apiscope --export inventory.json        Write the inventory on exit
    sudo apiscope --pii-token ssn --pii-token email"
)]
pub struct Args {
    /// Seconds without activity before an unclosed connection is dropped
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub inactivity_threshold: u64,

    /// Seconds between reap passes
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub reap_interval: u64,

    /// Per-direction capture cap for one connection
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_BUFFER_CAPACITY)]
    pub buffer_capacity: usize,

    /// Response token that marks an entry as carrying PII
    ///
    /// Repeatable. Replaces the default token list.
    #[arg(long = "pii-token", value_name = "TOKEN")]
    pub pii_tokens: Vec<String>,

    /// Only count a closed connection as malformed when both directions
    /// disagree with the kernel byte totals
    #[arg(long)]
    pub strict_malformed: bool,

    /// Only trace these processes (repeatable)
    #[arg(short, long = "pid", value_name = "PID")]
    pub pids: Vec<u32>,

    /// Compiled eBPF probe object
    #[arg(long, value_name = "PATH", default_value = DEFAULT_EBPF_OBJECT)]
    pub ebpf_object: PathBuf,

    /// Write the API inventory as JSON on exit
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn factory_config(&self) -> FactoryConfig {
        FactoryConfig {
            inactivity_threshold: Duration::from_secs(self.inactivity_threshold),
            buffer_capacity: self.buffer_capacity,
            malformed_policy: if self.strict_malformed {
                MalformedPolicy::BothSides
            } else {
                MalformedPolicy::AnySide
            },
        }
    }

    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval)
    }

    /// Detector for the configured tokens, or the defaults when none were given
    #[must_use]
    pub fn pii_detector(&self) -> SentinelPiiDetector {
        if self.pii_tokens.is_empty() {
            SentinelPiiDetector::new(DEFAULT_PII_TOKENS.iter().copied())
        } else {
            SentinelPiiDetector::new(self.pii_tokens.iter().cloned())
        }
    }
}
