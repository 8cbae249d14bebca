//! # pagescope - Main Entry Point
//!
//! `pagescope replay <FILE>` feeds a recorded session through the timeline
//! engine:
//! - **Summary** (default): progress line per tick, counts at the end
//! - **Headless** (`--headless`): every committed batch on stdout
//! - **Export** (`--export trace.json`): Chrome trace of the final timeline

// Time conversions lose precision for display
#![allow(clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use log::info;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::rc::Rc;

use pagescope::cli::{Args, Command, ReplayArgs};
use pagescope::display::{display_statistics, HeadlessDisplay};
use pagescope::domain::{ConfigError, ReplayError};
use pagescope::export::ChromeTraceExporter;
use pagescope::model::{ChannelListener, TimelineBatch};
use pagescope::replay::{profiler_event_counts, Recording, ReplayDriver, StepOutcome};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

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
    let usage = err.chain().any(|cause| {
        matches!(cause.downcast_ref::<ConfigError>(), Some(ConfigError::Json(_)))
            || matches!(
                cause.downcast_ref::<ReplayError>(),
                Some(ReplayError::ParseFailed(_) | ReplayError::EntryOutOfOrder { .. })
            )
    });
    if usage {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Replay(ref replay) => run_replay(replay, args.quiet).await,
    }
}

async fn run_replay(args: &ReplayArgs, quiet: bool) -> Result<()> {
    let config = args.timeline_config().context("Failed to load configuration")?;
    let recording = Recording::from_file(&args.file)
        .with_context(|| format!("Failed to load recording {}", args.file.display()))?;
    let (compile_events, execute_events) = profiler_event_counts(&recording);

    if !quiet {
        println!("pagescope v{}", env!("CARGO_PKG_VERSION"));
        println!("recording: {}", args.file.display());
        println!(
            "entries: {} (profiler: {compile_events} compile, {execute_events} execute)",
            recording.entries.len()
        );
    }

    let mut driver = ReplayDriver::new(recording, config)?;

    // The headless printer is the view; otherwise batches go to a channel
    // drained for the progress line.
    let display = args.headless.then(|| Rc::new(RefCell::new(HeadlessDisplay::stdout())));
    let (batch_tx, batch_rx) = bounded::<TimelineBatch>(1024);
    match &display {
        Some(display) => driver.start(Box::new(display.clone()))?,
        None => driver.start(Box::new(ChannelListener::new(batch_tx)))?,
    }

    let exporter = args.export.as_ref().map(|_| Rc::new(RefCell::new(ChromeTraceExporter::new())));
    if let Some(exporter) = &exporter {
        if let Some(model) = driver.manager_mut().model_mut() {
            model.add_listener(Box::new(exporter.clone()));
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let delay = driver.manager().refresh_delay();

    let mut exit_reason = "replay finished";
    let mut batches = 0usize;
    let mut last_horizon_usec = 0;
    loop {
        let outcome = driver.step()?;

        for batch in batch_rx.try_iter() {
            batches += 1;
            last_horizon_usec = batch.horizon_usec;
        }
        if let StepOutcome::Ticked { at_usec } = outcome {
            if !quiet && display.is_none() {
                print!(
                    "\r   t={:.1}ms  batches={batches}  horizon={:.1}ms   ",
                    at_usec as f64 / 1_000.0,
                    last_horizon_usec as f64 / 1_000.0
                );
                std::io::stdout().flush().ok();
            }
        } else {
            break;
        }

        if args.realtime {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = &mut ctrl_c => {
                    exit_reason = "interrupted";
                    break;
                }
            }
        }
    }

    if !quiet || args.headless {
        eprintln!(
            "\n{exit_reason}: {} ticks, {:.1}ms session time",
            driver.manager().tick_count(),
            driver.now_usec() as f64 / 1_000.0
        );
        if let Some(display) = &display {
            display_statistics(&display.borrow().stats);
        }
    }

    if let (Some(exporter), Some(export_path)) = (exporter, &args.export) {
        let file = File::create(export_path).context("Failed to create trace output file")?;
        let writer = BufWriter::new(file);
        exporter.borrow().export(writer).context("Failed to export trace")?;
        info!("exported {} spans", exporter.borrow().event_count());
        if !quiet {
            println!("saved: {}", export_path.display());
        }
    }

    Ok(())
}
