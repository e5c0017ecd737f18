/// One poll of the watched command: spawn it, collect stdout, report how it ended.
use crate::signals::Shutdown;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Output of a single invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Everything the command wrote to stdout.
    pub stdout: Vec<u8>,
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl Capture {
    /// Stand-in used when the command could not be run at all.
    pub fn empty() -> Self {
        Self {
            stdout: Vec::new(),
            exit_code: None,
            duration: Duration::ZERO,
        }
    }
}

/// Errors that can occur while capturing.
#[derive(Debug)]
pub enum CaptureError {
    /// The command could not be started (not found, not executable).
    Spawn {
        program: String,
        source: std::io::Error,
    },
    /// Reading stdout or waiting for the exit status failed.
    Io { source: std::io::Error },
    /// An immediate shutdown killed the command before it finished.
    Aborted,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Spawn { program, source } => {
                write!(f, "failed to start {}: {}", program, source)
            }
            CaptureError::Io { source } => {
                write!(f, "I/O error while capturing output: {}", source)
            }
            CaptureError::Aborted => write!(f, "capture aborted by shutdown"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Spawn { source, .. } => Some(source),
            CaptureError::Io { source } => Some(source),
            CaptureError::Aborted => None,
        }
    }
}

/// Something the monitor can poll for output.
#[allow(async_fn_in_trait)]
pub trait Probe {
    async fn capture(&mut self, shutdown: &Shutdown) -> Result<Capture, CaptureError>;
}

/// Runs an external command for every poll.
///
/// The command gets the monitor's environment, no stdin, and the monitor's
/// stderr. It runs in its own process group so that a terminal Ctrl-C
/// reaches the monitor only, and the whole group can be killed if a second
/// signal asks for an immediate stop.
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(command: &[String]) -> Self {
        let (program, args) = match command.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => (String::new(), Vec::new()),
        };
        Self { program, args }
    }
}

impl Probe for CommandProbe {
    async fn capture(&mut self, shutdown: &Shutdown) -> Result<Capture, CaptureError> {
        let start = Instant::now();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::Spawn {
                program: self.program.clone(),
                source: e,
            })?;

        let pid = child.id();
        debug!(pid = ?pid, command = %self.program, "command started");

        let mut stdout = child.stdout.take().ok_or_else(|| CaptureError::Io {
            source: std::io::Error::other("command stdout was not piped"),
        })?;

        let collect = async {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((buf, status))
        };

        let (stdout, status) = tokio::select! {
            result = collect => result.map_err(|e| CaptureError::Io { source: e })?,
            _ = shutdown.immediate() => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return Err(CaptureError::Aborted);
            }
        };

        let duration = start.elapsed();
        let exit_code = status.code();
        if let Some(raw) = status.signal() {
            let name = Signal::try_from(raw).map(|s| s.as_str()).unwrap_or("unknown");
            debug!(signal = name, "command terminated by signal");
        }
        debug!(
            exit_code = ?exit_code,
            output_bytes = stdout.len(),
            duration_ms = duration.as_millis() as u64,
            "command finished"
        );

        Ok(Capture {
            stdout,
            exit_code,
            duration,
        })
    }
}

fn kill_process_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        warn!(pid, error = %e, "failed to kill command process group");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::shutdown_channel;

    fn probe(args: &[&str]) -> CommandProbe {
        let command: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        CommandProbe::new(&command)
    }

    #[tokio::test]
    async fn test_capture_echo() {
        let (_trigger, shutdown) = shutdown_channel();
        let capture = probe(&["echo", "hello"]).capture(&shutdown).await.unwrap();
        assert_eq!(capture.stdout, b"hello\n");
        assert_eq!(capture.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_capture_keeps_missing_trailing_newline() {
        let (_trigger, shutdown) = shutdown_channel();
        let capture = probe(&["printf", "ABCDE"]).capture(&shutdown).await.unwrap();
        assert_eq!(capture.stdout, b"ABCDE");
    }

    #[tokio::test]
    async fn test_capture_ignores_stderr() {
        let (_trigger, shutdown) = shutdown_channel();
        let capture = probe(&["sh", "-c", "echo stdout-line; echo stderr-line >&2"])
            .capture(&shutdown)
            .await
            .unwrap();
        assert_eq!(capture.stdout, b"stdout-line\n");
    }

    #[tokio::test]
    async fn test_capture_nonzero_exit_is_not_an_error() {
        let (_trigger, shutdown) = shutdown_channel();
        let capture = probe(&["sh", "-c", "echo partial; exit 42"])
            .capture(&shutdown)
            .await
            .unwrap();
        assert_eq!(capture.exit_code, Some(42));
        assert_eq!(capture.stdout, b"partial\n");
    }

    #[tokio::test]
    async fn test_capture_spawn_failure() {
        let (_trigger, shutdown) = shutdown_channel();
        let err = probe(&["nonexistent-binary-xyz"])
            .capture(&shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Spawn { .. }));
        assert!(err.to_string().contains("failed to start nonexistent-binary-xyz"));
    }

    #[tokio::test]
    async fn test_capture_empty_command_fails_to_spawn() {
        let (_trigger, shutdown) = shutdown_channel();
        let err = CommandProbe::new(&[]).capture(&shutdown).await.unwrap_err();
        assert!(matches!(err, CaptureError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_capture_completes_on_graceful_shutdown() {
        let (trigger, shutdown) = shutdown_channel();
        trigger.escalate();
        let capture = probe(&["sh", "-c", "sleep 0.1; echo done"])
            .capture(&shutdown)
            .await
            .unwrap();
        assert_eq!(capture.stdout, b"done\n");
    }

    #[tokio::test]
    async fn test_capture_aborted_on_immediate_shutdown() {
        let (trigger, shutdown) = shutdown_channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.escalate();
            trigger.escalate();
        });

        let start = Instant::now();
        let err = probe(&["sleep", "30"])
            .capture(&shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Aborted));
        assert!(start.elapsed().as_secs() < 10);
    }
}
