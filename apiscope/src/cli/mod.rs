pub mod args;

pub use args::{Args, DEFAULT_EBPF_OBJECT};
