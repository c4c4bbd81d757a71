//! Receive side of the throughput benchmark.
//!
//! Usage:
//!   local_thr <bind-to> <message-size> <message-count> <disk-mountpoint> [writer-threads]
//!
//! Pass `/network` as the mountpoint to measure the network alone.

use clap::Parser;
use dmxp_localthr::config::RunConfig;
use dmxp_localthr::Core::host::hostname;
use dmxp_localthr::Pool::DiskSink;
use dmxp_localthr::runner::{bind_endpoint, write_header, Runner};
use dmxp_localthr::{Error, Sink};
use std::io;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "local_thr")]
#[command(about = "Measure receive throughput while persisting every message to disk")]
#[command(version)]
struct Args {
    /// Endpoint to bind, e.g. tcp://*:5555 or ipc:///tmp/local_thr.sock
    bind_to: String,

    /// Expected size of every message in bytes
    message_size: usize,

    /// Number of messages to receive
    message_count: u64,

    /// Filesystem root for <mountpoint>/data/testNNNNNN.dat, or /network
    disk_mountpoint: String,

    /// Concurrent writer threads (clamped to 1..=10)
    #[arg(default_value_t = 1)]
    writer_threads: usize,

    /// Fail the run if a writer slot stays busy longer than this
    #[arg(long, value_name = "MS")]
    stall_timeout_ms: Option<u64>,

    /// Create <mountpoint>/data before receiving
    #[arg(long)]
    create_data_dir: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(&args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<(), Error> {
    let config = RunConfig::builder(args.bind_to)
        .with_message_size(args.message_size)
        .with_message_count(args.message_count)
        .with_mountpoint(&args.disk_mountpoint)
        .with_workers(args.writer_threads)
        .with_stall_timeout(args.stall_timeout_ms.map(Duration::from_millis))
        .build()?;

    let mut stdout = io::stdout().lock();
    write_header(&mut stdout, &config, &hostname())?;

    if args.create_data_dir {
        if let Sink::Directory(root) = &config.sink {
            let sink = DiskSink::new(root);
            if let Err(e) = sink.ensure_data_dir() {
                warn!("cannot create {}/data: {e}", root.display());
            }
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    }) {
        warn!("cannot install Ctrl+C handler: {e}");
    }

    let endpoint = bind_endpoint(&config.bind)?.with_interrupt(Arc::clone(&running));
    let summary = Runner::new(config, endpoint)?
        .with_interrupt(running)
        .run(&mut stdout)?;

    info!(
        received = summary.received,
        gaps = summary.sequence_gaps,
        failed_writes = summary.pool.failed,
        "run complete"
    );
    Ok(())
}
