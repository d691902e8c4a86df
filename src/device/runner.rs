//! `v4l2-ctl` command runner
//!
//! Spawns the control tool, drains its output on helper threads and polls the
//! child until it exits or the timeout expires. A timed-out child is killed.

use crate::params::ControlledParameter;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Control tool used when none is configured
pub const DEFAULT_TOOL: &str = "v4l2-ctl";

/// Upper bound on a single invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Minimum wait for output after a child exits close to its deadline
const DRAIN_GRACE: Duration = Duration::from_millis(50);

/// Captured output of a successful invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

/// Failure of a single control invocation
#[derive(Debug, Error)]
pub enum CommandError {
    /// The tool ran and exited with a non-zero status
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        /// Command line that was run
        command: String,
        /// Exit status reported by the OS
        status: ExitStatus,
        /// Captured standard output, trimmed
        stdout: String,
        /// Captured standard error, trimmed
        stderr: String,
    },

    /// The tool did not exit before the timeout and was killed
    #[error("command timed out after {after:?}")]
    TimedOut {
        /// Timeout that expired
        after: Duration,
    },

    /// The tool executable could not be found
    #[error("`{tool}` not found; install v4l-utils")]
    ToolNotFound {
        /// Tool that was looked up
        tool: String,
    },

    /// The device node for the index does not exist
    #[error("/dev/video{index} does not exist")]
    DeviceUnavailable {
        /// Requested device index
        index: u32,
    },

    /// Spawning or waiting on the child failed
    #[error("failed to run control command: {0}")]
    Io(#[source] io::Error),
}

/// Adapter over the external control channel
///
/// Implementations spawn at most one external invocation per call and never retry.
pub trait DeviceCommandRunner: Send + Sync {
    /// Push `value` for `param` to device `/dev/video<device_index>`
    fn apply(
        &self,
        device_index: u32,
        param: ControlledParameter,
        value: i64,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runner invoking `v4l2-ctl` as a subprocess
#[derive(Debug, Clone)]
pub struct V4l2CtlRunner {
    tool: PathBuf,
    timeout: Duration,
    device_root: PathBuf,
    /// Set once the missing-tool hint has been logged
    missing_tool_reported: Arc<AtomicBool>,
}

impl Default for V4l2CtlRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL, DEFAULT_COMMAND_TIMEOUT)
    }
}

impl V4l2CtlRunner {
    /// Create a runner for `tool` with the given per-invocation timeout
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
            device_root: PathBuf::from("/dev"),
            missing_tool_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Look device nodes up under `root` instead of `/dev`
    #[must_use]
    pub fn with_device_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.device_root = root.into();
        self
    }

    /// Configured control tool
    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Path of the device node for `index`
    pub fn device_path(&self, index: u32) -> PathBuf {
        self.device_root.join(format!("video{index}"))
    }

    /// Arguments passed to the tool for one invocation
    pub fn build_args(
        &self,
        device_index: u32,
        param: ControlledParameter,
        value: i64,
    ) -> Vec<String> {
        vec![
            "--device".to_string(),
            self.device_path(device_index).to_string_lossy().into_owned(),
            "--set-ctrl".to_string(),
            format!("{}={value}", param.control_name()),
        ]
    }

    fn describe(&self, args: &[String]) -> String {
        let mut command = self.tool.to_string_lossy().into_owned();
        for arg in args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }

    /// Log the missing tool at error level the first time only
    fn report_missing_tool(&self) {
        use tracing::{debug, error};

        if self.missing_tool_reported.swap(true, Ordering::SeqCst) {
            debug!("{} still not found", self.tool.display());
        } else {
            error!(
                "{} not found. Please install v4l-utils (sudo apt install v4l-utils)",
                self.tool.display()
            );
        }
    }
}

impl DeviceCommandRunner for V4l2CtlRunner {
    fn apply(
        &self,
        device_index: u32,
        param: ControlledParameter,
        value: i64,
    ) -> Result<CommandOutput, CommandError> {
        use tracing::{debug, warn};

        if !self.device_path(device_index).exists() {
            return Err(CommandError::DeviceUnavailable {
                index: device_index,
            });
        }

        let args = self.build_args(device_index, param, value);
        let command = self.describe(&args);
        debug!("Running: {}", command);

        let child = Command::new(&self.tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    self.report_missing_tool();
                    CommandError::ToolNotFound {
                        tool: self.tool.to_string_lossy().into_owned(),
                    }
                } else {
                    CommandError::Io(e)
                }
            })?;

        let (status, output) = wait_with_timeout(child, self.timeout)?;
        if status.success() {
            debug!("{} succeeded: {}", command, output.stdout.trim());
            Ok(output)
        } else {
            let stdout = output.stdout.trim().to_string();
            if !stdout.is_empty() {
                warn!("{} printed before failing: {}", command, stdout);
            }
            Err(CommandError::Failed {
                command,
                status,
                stdout,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Which pipe a reader drained
enum Stream {
    Stdout,
    Stderr,
}

/// Wait for `child` to exit, killing it once `timeout` has elapsed
///
/// Output pipes are drained on helper threads so a chatty child cannot block on a
/// full pipe while it is being polled. Output is only collected until the
/// deadline: a pipe held open by a process the child left behind yields empty
/// output instead of blocking the caller.
fn wait_with_timeout(
    mut child: Child,
    timeout: Duration,
) -> Result<(ExitStatus, CommandOutput), CommandError> {
    let (tx, rx) = mpsc::channel();
    let readers = usize::from(spawn_reader(child.stdout.take(), Stream::Stdout, &tx))
        + usize::from(spawn_reader(child.stderr.take(), Stream::Stderr, &tx));
    drop(tx);
    let deadline = Instant::now() + timeout;

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                // Readers are detached; they finish once the pipes close
                return Err(CommandError::TimedOut { after: timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandError::Io(e));
            }
        }
    };

    let drain_deadline = deadline.max(Instant::now() + DRAIN_GRACE);
    Ok((status, collect_output(&rx, readers, drain_deadline)))
}

fn spawn_reader<R>(pipe: Option<R>, stream: Stream, tx: &mpsc::Sender<(Stream, String)>) -> bool
where
    R: Read + Send + 'static,
{
    let Some(mut pipe) = pipe else {
        return false;
    };
    let tx = tx.clone();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
    true
}

fn collect_output(
    rx: &mpsc::Receiver<(Stream, String)>,
    readers: usize,
    deadline: Instant,
) -> CommandOutput {
    use tracing::debug;

    let mut output = CommandOutput::default();
    for _ in 0..readers {
        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok((Stream::Stdout, text)) => output.stdout = text,
            Ok((Stream::Stderr, text)) => output.stderr = text,
            Err(_) => {
                debug!("Output pipe still open at the deadline, leaving its reader detached");
                break;
            }
        }
    }
    output
}
