//! # apiscope - Main Entry Point
//!
//! Loads the socket probes, drains their ring buffer into the connection
//! factory, and reaps finished connections on a background task until
//! Ctrl+C or SIGTERM.

#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use aya::maps::RingBuf;
use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

use apiscope::capture::{
    attach_socket_tracepoints, display_statistics, init_ebpf_logger, load_ebpf_program,
    print_capture_diagnostics, register_allowed_pids, EventDispatcher, Reaper,
};
use apiscope::cli::Args;
use apiscope::clock::KernelClock;
use apiscope::connections::Factory;
use apiscope::export::export_inventory;
use apiscope::preflight::run_preflight_checks;
use apiscope::schema::HttpJsonInference;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_NOPERM: i32 = 77;

/// Pause between ring buffer drains when idle
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often headless statistics are printed
const STATS_INTERVAL: Duration = Duration::from_secs(10);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = err.to_string().to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();
    let quiet = args.quiet;

    run_preflight_checks(&args.ebpf_object)?;

    if !quiet {
        println!("apiscope v{}", env!("CARGO_PKG_VERSION"));
        if args.pids.is_empty() {
            println!("tracing: all processes");
        } else {
            println!("tracing: pids {:?}", args.pids);
        }
        if let Some(ref export_path) = args.export {
            println!("export: {}", export_path.display());
        }
    }

    let clock = KernelClock::detect().unwrap_or_else(|e| {
        warn!("Clock offset unavailable, using time since boot: {e}");
        KernelClock::from_offset(0)
    });

    // ── Load and attach probes ──────────────────────────────────────────
    let mut bpf = load_ebpf_program(&args.ebpf_object)?;
    init_ebpf_logger(&mut bpf);
    register_allowed_pids(&mut bpf, &args.pids)
        .context("Failed to configure PID filter")?;
    let attached = attach_socket_tracepoints(&mut bpf)?;
    info!("Attached {attached} socket tracepoints");

    let events = bpf.take_map("EVENTS").context("EVENTS map not found")?;
    let mut ring_buf = RingBuf::try_from(events)?;

    // ── Connection tracking and reaping ─────────────────────────────────
    let inference = HttpJsonInference::new(Box::new(args.pii_detector()));
    let factory = Arc::new(Factory::new(args.factory_config(), Box::new(inference)));
    let mut dispatcher = EventDispatcher::new(Arc::clone(&factory));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = Reaper::new(Arc::clone(&factory), args.reap_interval(), clock, quiet);
    let reaper = Arc::new(reaper);
    let reaper_handle = tokio::spawn(Arc::clone(&reaper).run(shutdown_rx));

    if !quiet {
        println!("Sniffer ready, press Ctrl+C to stop");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut sigterm = signal(SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    let started = Instant::now();
    let mut stats_timer = Instant::now();

    // Main event processing loop
    loop {
        while let Some(item) = ring_buf.next() {
            dispatcher.process_record(&item);
        }

        if !quiet && stats_timer.elapsed() > STATS_INTERVAL {
            display_statistics(&dispatcher.stats, factory.tracked_connections());
            stats_timer = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = &mut ctrl_c => break,
            _ = sigterm.recv() => break,
        }
    }

    info!("Signaled to terminate");
    shutdown_tx.send(true).ok();
    if let Err(e) = reaper_handle.await {
        warn!("Reaper task failed: {e}");
    }

    // Final pass so connections closed just before shutdown are learned
    while let Some(item) = ring_buf.next() {
        dispatcher.process_record(&item);
    }
    reaper.reap_once();
    let inventory = factory.inventory();

    if !quiet {
        eprintln!(
            "\nstopped after {:.1}s: {} events, {} decode errors, {} connections still tracked",
            started.elapsed().as_secs_f64(),
            dispatcher.stats.events,
            dispatcher.stats.decode_errors,
            factory.tracked_connections(),
        );
    }

    if let Err(e) = print_capture_diagnostics(&bpf) {
        warn!("Capture diagnostics unavailable: {e}");
    }

    if let Some(ref export_path) = args.export {
        let file = File::create(export_path)
            .context("Failed to create inventory output file")?;
        export_inventory(&inventory, BufWriter::new(file))
            .context("Failed to export inventory")?;
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
