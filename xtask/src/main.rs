use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Compile the socket tracing programs to a BPF object
    BuildEbpf {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
    },
    /// Build everything and run apiscope under sudo
    Run {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Arguments forwarded to apiscope
        #[arg(last = true)]
        run_args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => {
            build_ebpf(&target)?;
        }
        Cmd::Run { target, run_args } => run(&target, &run_args)?,
    }

    Ok(())
}

/// Build the eBPF object and return its path.
///
/// Always release: debug BPF builds pull in formatting code the BPF linker rejects.
fn build_ebpf(target: &str) -> Result<PathBuf> {
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", "apiscope-ebpf"])
        .args(["--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to build eBPF program")?;

    if !status.success() {
        anyhow::bail!("Failed to build eBPF program");
    }

    let object = PathBuf::from("target")
        .join(target)
        .join("release")
        .join("apiscope");
    println!("✓ eBPF object: {}", object.display());
    Ok(object)
}

fn run(target: &str, run_args: &[String]) -> Result<()> {
    let object = build_ebpf(target)?;

    let status = Command::new("cargo")
        .args(["build", "--package", "apiscope"])
        .status()
        .context("Failed to build apiscope")?;
    if !status.success() {
        anyhow::bail!("Failed to build apiscope");
    }

    let status = Command::new("sudo")
        .arg("-E")
        .arg("target/debug/apiscope")
        .arg("--ebpf-object")
        .arg(&object)
        .args(run_args)
        .status()
        .context("Failed to launch apiscope")?;
    if !status.success() {
        anyhow::bail!("apiscope exited with {status}");
    }

    Ok(())
}
