//! `camsync` - Arducam exposure and frame-rate synchronizer
//!
//! Seeds the desired values from the command line, re-asserts them periodically
//! through `v4l2-ctl` and accepts apply requests on a line-based console.

use anyhow::{Context, Result};
use camsync::{
    config::{ConfigManager, SyncConfig},
    controller::ApplyRequestHandler,
    device::V4l2CtlRunner,
    error::get_user_friendly_error,
    params::{ControlledParameter, ParameterStore},
    scheduler::{SchedulerHandle, SyncContext, SyncEvent, SyncScheduler},
    utils,
};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tracing::{error, info, warn};

/// How often the console loop checks for Ctrl-C
const CONSOLE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(version, about = "Keep an Arducam's exposure and frame rate applied")]
struct Options {
    /// Video device index (/dev/videoN)
    #[arg(short = 'v', long, default_value_t = 0)]
    device: u32,

    /// Initial exposure in microseconds, clamped to [1, 65523]
    #[arg(
        long,
        default_value_t = ControlledParameter::Exposure.default_value(),
        allow_negative_numbers = true
    )]
    exposure: i64,

    /// Initial frame rate in fps, clamped to [5, 120]
    #[arg(
        long,
        default_value_t = ControlledParameter::FrameRate.default_value(),
        allow_negative_numbers = true
    )]
    framerate: i64,

    /// Scheduler period in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Per-invocation timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Re-apply confirmed values older than this many milliseconds
    #[arg(long)]
    reassert_after_ms: Option<u64>,

    /// Control tool to invoke
    #[arg(long)]
    tool: Option<PathBuf>,

    /// JSON file with runtime options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write logs to camsync.log in this directory instead of stderr
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Options {
    /// Overlay command-line flags on file options
    fn apply_overrides(&self, config: &mut SyncConfig) {
        if let Some(interval_ms) = self.interval_ms {
            config.sync_interval_ms = interval_ms;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.command_timeout_ms = timeout_ms;
        }
        if self.reassert_after_ms.is_some() {
            config.reassert_after_ms = self.reassert_after_ms;
        }
        if let Some(tool) = &self.tool {
            config.tool.clone_from(tool);
        }
    }
}

/// A parsed console line
#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Apply(ControlledParameter, i64),
    Status,
    Resume,
    Help,
    Quit,
}

fn parse_command(line: &str) -> std::result::Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "exposure" | "e" => {
            ConsoleCommand::Apply(ControlledParameter::Exposure, parse_value(words.next())?)
        }
        "framerate" | "fps" | "f" => {
            ConsoleCommand::Apply(ControlledParameter::FrameRate, parse_value(words.next())?)
        }
        "status" | "s" => ConsoleCommand::Status,
        "resume" => ConsoleCommand::Resume,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{other}', type 'help'")),
    };

    if words.next().is_some() {
        return Err("too many arguments".to_string());
    }
    Ok(Some(command))
}

fn parse_value(word: Option<&str>) -> std::result::Result<i64, String> {
    let word = word.ok_or_else(|| "missing value".to_string())?;
    word.parse().map_err(|_| format!("'{word}' is not a whole number"))
}

fn print_help() {
    println!("Commands:");
    for param in ControlledParameter::ALL {
        let (min, max) = param.bounds();
        let verb = match param {
            ControlledParameter::Exposure => "exposure",
            ControlledParameter::FrameRate => "framerate",
        };
        println!(
            "  {verb} <N>   apply {} now ({min}-{max} {})",
            param.label(),
            param.unit()
        );
    }
    println!("  status         show desired and applied values");
    println!("  resume         resume synchronization after the device returns");
    println!("  quit           exit");
}

fn print_event(event: &SyncEvent) {
    match event {
        SyncEvent::Applied { param, value, source } => {
            println!("{} set to {} {} ({:?})", param.label(), value, param.unit(), source);
        }
        SyncEvent::Failed {
            param,
            value,
            reason,
            ..
        } => {
            println!("{} {} not applied: {}", param.label(), value, reason);
        }
        SyncEvent::DeviceUnavailable { index } => {
            println!("/dev/video{index} is unavailable, synchronization paused (type 'resume')");
        }
    }
}

/// Read stdin lines on a dedicated thread so the main loop can watch for Ctrl-C
fn spawn_console_reader() -> Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("camsync-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn console reader thread")?;
    Ok(rx)
}

/// Execute one console command, returning false when the program should exit
fn dispatch(
    command: ConsoleCommand,
    handler: &ApplyRequestHandler,
    handle: &SchedulerHandle,
) -> Result<bool> {
    match command {
        ConsoleCommand::Apply(param, value) => match handler.apply_now(param, value) {
            Ok(outcome) => info!("Apply {} = {} finished: {:?}", param, value, outcome),
            Err(e) => {
                warn!("Apply {} = {} rejected: {}", param, value, e);
                println!("{}", get_user_friendly_error(&e));
            }
        },
        ConsoleCommand::Status => {
            let snapshot = handler.snapshot();
            println!(
                "{}",
                serde_json::to_string_pretty(&snapshot).context("Failed to render status")?
            );
            if handle.is_suspended() {
                println!("synchronization paused, device unavailable");
            }
        }
        ConsoleCommand::Resume => handle.resume(),
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

fn main() -> Result<()> {
    let options = Options::parse();

    utils::init_logging(options.log_dir.as_deref()).context("Failed to initialize logging system")?;

    let mut config =
        ConfigManager::load(options.config.as_deref()).context("Failed to load configuration")?;
    options.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let store = Arc::new(ParameterStore::seeded(options.exposure, options.framerate));
    let runner = Arc::new(V4l2CtlRunner::new(config.tool.clone(), config.command_timeout()));
    let (event_tx, event_rx) = mpsc::sync_channel(config.event_capacity);
    let ctx = SyncContext::new(Arc::clone(&store), runner, options.device).with_events(event_tx);

    let handler = ApplyRequestHandler::new(ctx.clone());
    let handle = SyncScheduler::new(ctx, config.sync_interval())
        .with_stale_after(config.reassert_after())
        .start()
        .context("Failed to start sync scheduler")?;

    info!(
        "Synchronizing /dev/video{} (exposure {} us, frame rate {} fps)",
        options.device,
        store.target(ControlledParameter::Exposure),
        store.target(ControlledParameter::FrameRate)
    );

    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit = Arc::clone(&quit);
        ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    let lines = spawn_console_reader()?;
    print_help();

    while !quit.load(Ordering::SeqCst) {
        for event in event_rx.try_iter() {
            print_event(&event);
        }

        let line = match lines.recv_timeout(CONSOLE_POLL) {
            Ok(line) => line,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("Console closed");
                // Keep synchronizing until Ctrl-C when stdin is not interactive
                while !quit.load(Ordering::SeqCst) {
                    for event in event_rx.try_iter() {
                        print_event(&event);
                    }
                    std::thread::sleep(CONSOLE_POLL);
                }
                break;
            }
        };

        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(command)) => {
                if !dispatch(command, &handler, &handle)? {
                    break;
                }
            }
            Err(msg) => println!("{msg}"),
        }
    }

    info!("Shutting down");
    handle.stop();

    if store.last_applied(ControlledParameter::Exposure).is_none()
        || store.last_applied(ControlledParameter::FrameRate).is_none()
    {
        error!("Exiting before every parameter was confirmed on the device");
    }

    Ok(())
}
