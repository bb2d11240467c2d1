//! CAN Trace CLI Application
//!
//! Command-line front end for the can-trace library:
//! - Replay a recorded field event stream into a trace file
//! - Export captured CSV tables to TRC
//! - Normalize legacy UTF-16 tables to UTF-8
//! - Print a trace file

use anyhow::{bail, Context, Result};
use can_trace::{
    run_batch, BatchConfig, CancelToken, CaptureConfig, CaptureSession, EncodingNormalizer,
    FileJob, FrameObserver, LogObserver, NullObserver, OverwritePolicy, SessionSummary, TrcExporter,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

mod config;
mod events;
mod report;

use events::EventReader;

/// CAN Trace - capture and transcode CAN traces
#[derive(Parser, Debug)]
#[command(name = "can-trace-cli")]
#[command(about = "Capture CAN frames from decoder events and convert trace tables", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a JSON-lines field event stream into a trace file
    Capture {
        /// Event stream to read (default: stdin)
        #[arg(short, long, value_name = "FILE")]
        events: Option<PathBuf>,

        /// Trace file to write
        #[arg(short, long, value_name = "FILE")]
        dump: Option<PathBuf>,

        /// Append to an existing trace file instead of overwriting it
        #[arg(long)]
        append: bool,

        /// Log frames with this CAN ID as they are assembled
        #[arg(long, value_name = "ID", value_parser = parse_can_id)]
        trace_id: Option<u32>,
    },

    /// Convert every CSV table in a directory to TRC
    ExportTrc {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Rewrite legacy UTF-16 CSV tables in a directory as UTF-8
    Normalize {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Print the frames of a trace file
    Show {
        /// Trace file written by `capture`
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct BatchArgs {
    /// Directory to scan (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Process files one at a time
    #[arg(long)]
    sequential: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Trace CLI v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using can-trace library v{}", can_trace::VERSION);

    let app_config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => config::AppConfig::default(),
    };

    match args.command {
        Command::Capture {
            events,
            dump,
            append,
            trace_id,
        } => {
            let mut capture = app_config.capture;
            if let Some(dump) = dump {
                capture.dump_path = dump;
            }
            if append {
                capture.policy = OverwritePolicy::Append;
            }
            if trace_id.is_some() {
                capture.trace_id = trace_id;
            }
            capture_mode(&capture, events)
        }
        Command::ExportTrc { batch } => batch_mode(&TrcExporter, apply_batch_args(app_config.batch, batch)),
        Command::Normalize { batch } => {
            batch_mode(&EncodingNormalizer, apply_batch_args(app_config.batch, batch))
        }
        Command::Show { file } => show_mode(&file),
    }
}

fn apply_batch_args(mut config: BatchConfig, args: BatchArgs) -> BatchConfig {
    if let Some(dir) = args.dir {
        config.directory = dir;
    }
    if args.sequential {
        config.parallel = false;
    }
    config
}

/// Accept decimal or 0x-prefixed hex CAN IDs
fn parse_can_id(value: &str) -> std::result::Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid CAN ID {:?}: {}", value, e))
}

/// Capture mode - replay events until the stream ends, then shut down cleanly
fn capture_mode(config: &CaptureConfig, events: Option<PathBuf>) -> Result<()> {
    let input: Box<dyn BufRead> = match &events {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open event stream: {:?}", path))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let observer: Box<dyn FrameObserver> = match config.trace_id {
        Some(_) => Box::new(LogObserver),
        None => Box::new(NullObserver),
    };

    let summary = run_capture(config, observer, input)?;
    println!(
        "✓ Capture complete: {} frames written to {:?}",
        summary.frames_written, config.dump_path
    );
    if summary.discarded_partial {
        println!("  (an unfinished frame at end of stream was discarded)");
    }
    Ok(())
}

/// Drive one capture session; the trace file is closed on every path
fn run_capture<O: FrameObserver>(config: &CaptureConfig, observer: O, input: impl BufRead) -> Result<SessionSummary> {
    let mut session = CaptureSession::open_with_observer(config, observer)
        .with_context(|| format!("Failed to open trace file: {:?}", config.dump_path))?;

    let mut failure = None;
    for event in EventReader::new(input) {
        let pushed = event.and_then(|event| session.push(event).map_err(anyhow::Error::from));
        if let Err(e) = pushed {
            failure = Some(e);
            break;
        }
    }

    let frames_written = session.frames_written();
    match (failure, session.finish()) {
        (None, Ok(summary)) => Ok(summary),
        (None, Err(close)) => Err(anyhow::Error::from(close).context("Failed to close trace file")),
        (Some(e), Ok(_)) => Err(e.context(format!("Capture session failed after {} frames", frames_written))),
        (Some(e), Err(close)) => Err(e.context(format!(
            "Capture session failed after {} frames (closing the trace file also failed: {})",
            frames_written, close
        ))),
    }
}

/// Batch mode - run a file job over a directory and report per file
fn batch_mode<J: FileJob>(job: &J, config: BatchConfig) -> Result<()> {
    let cancel = CancelToken::new();
    let summary = run_batch(job, &config, &cancel)
        .with_context(|| format!("Failed to scan directory: {:?}", config.directory))?;

    report::print_batch_summary(job.name(), &summary);

    if summary.failed() > 0 {
        bail!("{} file(s) failed", summary.failed());
    }
    Ok(())
}

/// Show mode - print every frame of a trace file
fn show_mode(path: &Path) -> Result<()> {
    let frames = can_trace::read_trace_file(path)
        .with_context(|| format!("Failed to read trace file: {:?}", path))?;

    for frame in &frames {
        println!("{}", report::format_frame(frame));
    }
    log::info!("{} frames in {:?}", frames.len(), path);
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
